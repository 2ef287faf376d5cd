use rand::Rng;

use crate::domain::ObjectRule;

/// Produce the next simulated value for an object.
///
/// Continuous rules drift the last value by the rule's constant. A zero
/// constant is replaced in the caller's rule instance by a fresh uniform
/// `[0,1)` draw, so subsequent iterations of the same driver keep drifting by
/// the same step; the substitution is never persisted.
///
/// Bounded rules draw uniformly in `[min_value, max_value)`. The zero rule
/// (empty range) yields a constant 0.0.
pub fn next_value(rule: &mut ObjectRule, last_value: f32) -> f32 {
    if rule.is_continuous {
        if rule.constant == 0.0 {
            rule.constant = rand::thread_rng().gen::<f32>();
        }
        last_value + rule.constant
    } else {
        let span = rule.max_value - rule.min_value;
        rule.min_value + rand::thread_rng().gen::<f32>() * span
    }
}
