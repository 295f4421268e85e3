// Bounds checks applied to submitted results before they reach the store.

use super::error::ApiError;

/// Longest accepted run: 24 hours.
pub const MAX_TIME_SECONDS: i64 = 86_400;
pub const MAX_CLICKS: i64 = 1_000;

/// Check a submitted `(time, clicks)` pair and narrow it to stored types.
pub fn validate_result(time: Option<i64>, clicks: Option<i64>) -> Result<(u32, u32), ApiError> {
    let time = time.ok_or_else(|| ApiError::Validation("time is required".into()))?;
    let clicks = clicks.ok_or_else(|| ApiError::Validation("clicks is required".into()))?;

    let time = checked(time, MAX_TIME_SECONDS).ok_or_else(|| {
        ApiError::Validation(format!("invalid time (0-{MAX_TIME_SECONDS} seconds)"))
    })?;
    let clicks = checked(clicks, MAX_CLICKS)
        .ok_or_else(|| ApiError::Validation(format!("invalid clicks (0-{MAX_CLICKS})")))?;

    Ok((time, clicks))
}

fn checked(value: i64, max: i64) -> Option<u32> {
    if (0..=max).contains(&value) {
        u32::try_from(value).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_bounds() {
        assert_eq!(validate_result(Some(0), Some(0)).unwrap(), (0, 0));
        assert_eq!(
            validate_result(Some(86_400), Some(1_000)).unwrap(),
            (86_400, 1_000)
        );
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(validate_result(Some(86_401), Some(0)).is_err());
        assert!(validate_result(Some(0), Some(1_001)).is_err());
        assert!(validate_result(Some(-1), Some(0)).is_err());
        assert!(validate_result(Some(0), Some(-5)).is_err());
    }

    #[test]
    fn test_rejects_missing_fields() {
        let err = validate_result(None, Some(1)).unwrap_err();
        assert_eq!(err.to_string(), "time is required");
        let err = validate_result(Some(1), None).unwrap_err();
        assert_eq!(err.to_string(), "clicks is required");
    }
}
