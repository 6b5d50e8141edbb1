//! InfluxDB line protocol encoding (second precision)

use crate::error::{Result, TimeSeriesError};
use crate::sample::{StakeSample, MEASUREMENT};
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Encode a batch, one line per sample
pub fn encode_batch(samples: &[StakeSample]) -> Result<String> {
    let mut body = String::new();
    for sample in samples {
        body.push_str(&encode(sample)?);
        body.push('\n');
    }
    Ok(body)
}

/// Encode a single sample
///
/// ```text
/// crawler_node_info,staker_address=0xA worker_address="0xW",stake=1,... 1685620800
/// ```
pub fn encode(sample: &StakeSample) -> Result<String> {
    let mut line = String::with_capacity(192);

    line.push_str(MEASUREMENT);
    line.push_str(",staker_address=");
    line.push_str(&escape_tag(sample.staker_address.as_str()));
    line.push(' ');

    line.push_str("worker_address=\"");
    line.push_str(&escape_string_field(&sample.worker_address));
    line.push('"');

    for (name, value) in [
        ("start_date", epoch_seconds(&sample.start_date)),
        ("end_date", epoch_seconds(&sample.end_date)),
        ("stake", sample.stake),
        ("locked_stake", sample.locked_stake),
    ] {
        if !value.is_finite() {
            return Err(TimeSeriesError::InvalidSample(format!(
                "{name} is not finite for {}",
                sample.staker_address
            )));
        }
        // writing to a String cannot fail
        let _ = write!(line, ",{name}={value}");
    }

    let _ = write!(
        line,
        ",current_period={}i,last_confirmed_period={}i {}",
        sample.current_period,
        sample.last_confirmed_period,
        sample.timestamp.timestamp()
    );

    Ok(line)
}

fn epoch_seconds(ts: &DateTime<Utc>) -> f64 {
    ts.timestamp() as f64
}

fn escape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_string_field(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fleetmon_core::ChecksumAddress;

    fn sample() -> StakeSample {
        StakeSample {
            staker_address: ChecksumAddress::new("0xAAA").unwrap(),
            worker_address: "0xWORKER".to_string(),
            stake: 15000.5,
            locked_stake: 15000.0,
            current_period: 2650,
            last_confirmed_period: 2649,
            start_date: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            timestamp: Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_encode_sample() {
        let line = encode(&sample()).unwrap();
        assert_eq!(
            line,
            "crawler_node_info,staker_address=0xAAA \
             worker_address=\"0xWORKER\",start_date=1672531200,end_date=1704067200,\
             stake=15000.5,locked_stake=15000,current_period=2650i,last_confirmed_period=2649i \
             1685620800"
        );
    }

    #[test]
    fn test_encode_escapes_string_field() {
        let mut s = sample();
        s.worker_address = "a\"b\\c".to_string();
        let line = encode(&s).unwrap();
        assert!(line.contains(r#"worker_address="a\"b\\c""#));
    }

    #[test]
    fn test_escape_tag() {
        assert_eq!(escape_tag("a,b=c d"), r"a\,b\=c\ d");
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let mut s = sample();
        s.locked_stake = f64::NAN;
        assert!(matches!(encode(&s), Err(TimeSeriesError::InvalidSample(_))));
    }

    #[test]
    fn test_encode_batch_one_line_per_sample() {
        let body = encode_batch(&[sample(), sample(), sample()]).unwrap();
        assert_eq!(body.lines().count(), 3);
        assert!(body.ends_with('\n'));
        assert!(encode_batch(&[]).unwrap().is_empty());
    }
}
