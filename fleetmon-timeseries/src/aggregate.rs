//! Two-stage daily aggregation
//!
//! Samples are bucketed by UTC calendar day. Within a bucket each staker
//! contributes only its last observation; the per-staker values are then
//! combined. Days without samples produce no entry.

use crate::sample::StakeSample;
use chrono::{DateTime, NaiveDate, Utc};
use fleetmon_core::{ChecksumAddress, DayWindow};
use std::collections::{BTreeMap, HashMap};

type LastPerStaker<'a> = BTreeMap<NaiveDate, HashMap<&'a ChecksumAddress, (DateTime<Utc>, f64)>>;

/// Last locked stake per staker per day, inside `window`
fn last_locked_stake<'a>(samples: &'a [StakeSample], window: &DayWindow) -> LastPerStaker<'a> {
    let mut days: LastPerStaker<'a> = BTreeMap::new();

    for sample in samples.iter().filter(|s| window.contains(&s.timestamp)) {
        let day = days.entry(sample.timestamp.date_naive()).or_default();
        let observed = (sample.timestamp, sample.locked_stake);
        day.entry(&sample.staker_address)
            .and_modify(|last| {
                // equal timestamps: later input wins
                if observed.0 >= last.0 {
                    *last = observed;
                }
            })
            .or_insert(observed);
    }

    days
}

/// Per day: sum over stakers of each staker's last locked stake that day
pub fn daily_locked_stake_sum(
    samples: &[StakeSample],
    window: &DayWindow,
) -> BTreeMap<NaiveDate, f64> {
    last_locked_stake(samples, window)
        .into_iter()
        .map(|(day, stakers)| (day, stakers.values().map(|(_, v)| v).sum()))
        .collect()
}

/// Per day: number of distinct stakers with at least one sample that day
pub fn daily_staker_count(
    samples: &[StakeSample],
    window: &DayWindow,
) -> BTreeMap<NaiveDate, u64> {
    last_locked_stake(samples, window)
        .into_iter()
        .map(|(day, stakers)| (day, stakers.len() as u64))
        .collect()
}
