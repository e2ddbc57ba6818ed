use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;

/// Millisecond-precision bridge for update documents; full models go through
/// the serde helpers in `models`.
pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn conversion_keeps_millis() {
        let dt = Utc.with_ymd_and_hms(2026, 6, 1, 12, 30, 45).unwrap();
        assert_eq!(chrono_to_bson(dt).timestamp_millis(), dt.timestamp_millis());
    }
}
