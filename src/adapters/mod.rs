pub mod cloud;
pub mod mysql;

pub use cloud::CloudClient;
pub use mysql::MySqlRepository;
