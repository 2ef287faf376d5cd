pub mod rule_cache;
