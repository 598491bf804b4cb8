//! Per-mention quality factors.

/// Weight never drops below this, so old-but-cached mentions still count.
pub const DECAY_FLOOR: f64 = 0.2;

/// Penalty applied when engagement is unknown or negligible.
pub const LOW_ENGAGEMENT_PENALTY: f64 = 0.8;

/// Exponential half-life decay clamped to `[DECAY_FLOOR, 1.0]`.
pub fn time_decay(age_minutes: f64, half_life_minutes: f64) -> f64 {
    if half_life_minutes <= 0.0 {
        return DECAY_FLOOR;
    }
    let age = age_minutes.max(0.0);
    0.5_f64.powf(age / half_life_minutes).clamp(DECAY_FLOOR, 1.0)
}

fn upvote_step(upvotes: u32) -> f64 {
    match upvotes {
        1000.. => 1.5,
        500..=999 => 1.3,
        200..=499 => 1.2,
        100..=199 => 1.1,
        20..=99 => 1.0,
        _ => LOW_ENGAGEMENT_PENALTY,
    }
}

fn comment_step(comments: u32) -> f64 {
    match comments {
        200.. => 1.5,
        100..=199 => 1.3,
        50..=99 => 1.2,
        20..=49 => 1.1,
        5..=19 => 1.0,
        _ => LOW_ENGAGEMENT_PENALTY,
    }
}

/// Average of the upvote and comment step functions. Missing counters count
/// as low engagement, never as zero weight.
pub fn engagement_multiplier(upvotes: Option<u32>, comments: Option<u32>) -> f64 {
    let up = upvotes.map(upvote_step).unwrap_or(LOW_ENGAGEMENT_PENALTY);
    let cm = comments.map(comment_step).unwrap_or(LOW_ENGAGEMENT_PENALTY);
    (up + cm) / 2.0
}

const FLAIR_TABLE: &[(&str, f64)] = &[
    ("dd", 1.5),
    ("due diligence", 1.5),
    ("technical analysis", 1.3),
    ("fundamentals", 1.3),
    ("news", 1.2),
    ("chart", 1.1),
    ("discussion", 1.0),
    ("daily discussion", 0.7),
    ("gain", 0.5),
    ("loss", 0.5),
    ("yolo", 0.4),
    ("meme", 0.3),
    ("shitpost", 0.3),
];

/// Trust multiplier for a post category. Unknown or absent flair is neutral.
pub fn flair_multiplier(flair: Option<&str>) -> f64 {
    let Some(flair) = flair else {
        return 1.0;
    };
    let key = flair.trim().to_ascii_lowercase();
    FLAIR_TABLE
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, mult)| *mult)
        .unwrap_or(1.0)
}
