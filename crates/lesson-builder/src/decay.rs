use chrono::{DateTime, Utc};
use trend_core::{ExecutionLevers, Lesson, Override};

/// λ such that exp(-λ * half_life_hours) = 0.5.
pub fn lambda_for_half_life(half_life_hours: f64) -> f64 {
    std::f64::consts::LN_2 / half_life_hours.max(1e-6)
}

/// value(t) = neutral + (lesson_value - neutral) * exp(-λ * age_hours).
/// Asymptotes to `neutral` as age → ∞ regardless of strength (I6).
pub fn decay_toward_neutral(lesson_value: f64, neutral: f64, age_hours: f64, lambda: f64) -> f64 {
    neutral + (lesson_value - neutral) * (-lambda * age_hours).exp()
}

/// Materializes a time-decayed Override from a Lesson, read-time only —
/// no mutation of the Lesson itself. Idempotent: calling this twice at
/// the same `now` yields the same Override.
pub fn materialize(lesson: &Lesson, now: DateTime<Utc>, half_life_hours: f64) -> Override {
    let age_hours = (now - lesson.issued_at).num_seconds().max(0) as f64 / 3_600.0;
    let lambda = lambda_for_half_life(half_life_hours);

    let size_mult = decay_toward_neutral(lesson.size_mult, 1.0, age_hours, lambda);
    let entry_aggression_mult = decay_toward_neutral(lesson.entry_aggression_mult, 1.0, age_hours, lambda);
    let exit_aggression_mult = decay_toward_neutral(lesson.exit_aggression_mult, 1.0, age_hours, lambda);

    let levers = &lesson.execution_levers;
    let execution_levers = ExecutionLevers {
        entry_delay_bars: decay_toward_neutral(levers.entry_delay_bars, 0.0, age_hours, lambda),
        phase1_frac_mult: decay_toward_neutral(levers.phase1_frac_mult, 1.0, age_hours, lambda),
        trim_delay_mult: decay_toward_neutral(levers.trim_delay_mult, 1.0, age_hours, lambda),
        trail_mult: decay_toward_neutral(levers.trail_mult, 1.0, age_hours, lambda),
        signal_threshold_mult: decay_toward_neutral(levers.signal_threshold_mult, 1.0, age_hours, lambda),
    };

    Override {
        scope_key: lesson.scope_key.clone(),
        size_mult,
        entry_aggression_mult,
        exit_aggression_mult,
        execution_levers,
        computed_at: now,
    }
}
