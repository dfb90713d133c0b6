//! Search statistics kept next to the cached results.
//!
//! Writes and reads are each one atomic batch, so readers never see a
//! search counted without its samples.

use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

use crate::backend::{CacheOp, CacheReply};
use crate::keys::KeySpace;
use crate::CacheError;

/// Response-time and result-count samples retained per list.
pub const SAMPLE_RETENTION: usize = 1000;
/// Newest samples averaged by [`SearchStats`].
pub const AVERAGE_WINDOW: usize = 100;
pub const POPULAR_QUERY_LIMIT: usize = 10;
/// Lifetime of a per-day search counter.
pub const DAILY_RETENTION: Duration = Duration::from_secs(30 * 24 * 3600);

pub(crate) const SEARCH_COUNT: &str = "search_count";
pub(crate) const POPULAR_QUERIES: &str = "popular_queries";
pub(crate) const RESPONSE_TIMES: &str = "response_times";
pub(crate) const RESULT_COUNTS: &str = "result_counts";
pub(crate) const CACHE_HITS: &str = "cache_hits";
pub(crate) const CACHE_MISSES: &str = "cache_misses";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularQuery {
    pub query: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub total_searches: u64,
    /// Most searched queries, highest score first.
    pub popular_queries: Vec<PopularQuery>,
    /// Mean over the newest samples, in seconds.
    pub avg_response_time: f64,
    pub avg_result_count: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Percentage of lookups that hit, 0 when nothing was looked up.
    pub cache_hit_rate: f64,
}

pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64 * 100.0
    }
}

/// The batch recording one executed search.
pub(crate) fn record_ops(
    keys: &KeySpace,
    query: &str,
    result_count: usize,
    response_time: Duration,
    today: NaiveDate,
) -> Vec<CacheOp> {
    let keep_until = SAMPLE_RETENTION as isize - 1;
    let daily = keys.daily_searches(today);
    vec![
        CacheOp::Incr(keys.stat(SEARCH_COUNT)),
        CacheOp::ZIncrBy {
            key: keys.stat(POPULAR_QUERIES),
            member: query.to_string(),
            by: 1.0,
        },
        CacheOp::LPush {
            key: keys.stat(RESPONSE_TIMES),
            value: response_time.as_secs_f64().to_string(),
        },
        CacheOp::LTrim {
            key: keys.stat(RESPONSE_TIMES),
            start: 0,
            stop: keep_until,
        },
        CacheOp::LPush {
            key: keys.stat(RESULT_COUNTS),
            value: result_count.to_string(),
        },
        CacheOp::LTrim {
            key: keys.stat(RESULT_COUNTS),
            start: 0,
            stop: keep_until,
        },
        CacheOp::Incr(daily.clone()),
        CacheOp::Expire {
            key: daily,
            ttl: DAILY_RETENTION,
        },
    ]
}

/// The batch reading everything [`SearchStats`] needs.
pub(crate) fn read_ops(keys: &KeySpace) -> Vec<CacheOp> {
    vec![
        CacheOp::Get(keys.stat(SEARCH_COUNT)),
        CacheOp::ZRevRangeWithScores {
            key: keys.stat(POPULAR_QUERIES),
            start: 0,
            stop: POPULAR_QUERY_LIMIT as isize - 1,
        },
        CacheOp::LRange {
            key: keys.stat(RESPONSE_TIMES),
            start: 0,
            stop: AVERAGE_WINDOW as isize - 1,
        },
        CacheOp::LRange {
            key: keys.stat(RESULT_COUNTS),
            start: 0,
            stop: AVERAGE_WINDOW as isize - 1,
        },
        CacheOp::Get(keys.stat(CACHE_HITS)),
        CacheOp::Get(keys.stat(CACHE_MISSES)),
    ]
}

pub(crate) fn parse_stats(replies: &[CacheReply]) -> Result<SearchStats, CacheError> {
    let [total, popular, times, counts, hits, misses] = replies else {
        return Err(CacheError::Backend(format!(
            "expected 6 stats replies, got {}",
            replies.len()
        )));
    };

    let counter = |reply: &CacheReply| {
        reply
            .as_i64()
            .map(|v| v.max(0) as u64)
            .ok_or_else(|| CacheError::Backend(format!("unexpected counter reply {reply:?}")))
    };
    let popular_queries = match popular {
        CacheReply::Scored(members) => members
            .iter()
            .map(|(query, score)| PopularQuery {
                query: query.clone(),
                score: *score,
            })
            .collect(),
        other => {
            return Err(CacheError::Backend(format!(
                "unexpected popular queries reply {other:?}"
            )))
        }
    };

    let cache_hits = counter(hits)?;
    let cache_misses = counter(misses)?;
    Ok(SearchStats {
        total_searches: counter(total)?,
        popular_queries,
        avg_response_time: average(times),
        avg_result_count: average(counts),
        cache_hits,
        cache_misses,
        cache_hit_rate: hit_rate(cache_hits, cache_misses),
    })
}

/// Mean of the numeric samples in a list reply; unparsable samples are skipped.
fn average(reply: &CacheReply) -> f64 {
    let CacheReply::List(items) = reply else {
        return 0.0;
    };
    let samples: Vec<f64> = items
        .iter()
        .filter_map(|s| s.trim().parse::<f64>().ok())
        .collect();
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hit_rate() {
        assert_eq!(hit_rate(0, 0), 0.0);
        assert_eq!(hit_rate(3, 1), 75.0);
        assert_eq!(hit_rate(0, 5), 0.0);
    }

    #[test]
    fn test_record_ops_shape() {
        let keys = KeySpace::new("p:");
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let ops = record_ops(&keys, "hamulce", 7, Duration::from_millis(250), date);

        assert_eq!(ops.len(), 8);
        assert_eq!(ops[0], CacheOp::Incr("p:stats:search_count".into()));
        assert_eq!(
            ops[2],
            CacheOp::LPush {
                key: "p:stats:response_times".into(),
                value: "0.25".into(),
            }
        );
        assert_eq!(
            ops[3],
            CacheOp::LTrim {
                key: "p:stats:response_times".into(),
                start: 0,
                stop: 999,
            }
        );
        assert_eq!(
            ops[7],
            CacheOp::Expire {
                key: "p:stats:daily:2024-05-01:searches".into(),
                ttl: DAILY_RETENTION,
            }
        );
    }

    #[test]
    fn test_parse_stats() {
        let replies = vec![
            CacheReply::Str("12".into()),
            CacheReply::Scored(vec![("hamulce".into(), 5.0), ("opony".into(), 2.0)]),
            CacheReply::List(vec!["0.5".into(), "1.5".into()]),
            CacheReply::List(vec!["10".into(), "".into(), "20".into()]),
            CacheReply::Str("3".into()),
            CacheReply::Nil,
        ];
        let stats = parse_stats(&replies).unwrap();
        assert_eq!(stats.total_searches, 12);
        assert_eq!(stats.popular_queries[0].query, "hamulce");
        assert_eq!(stats.avg_response_time, 1.0);
        assert_eq!(stats.avg_result_count, 15.0);
        assert_eq!(stats.cache_hits, 3);
        assert_eq!(stats.cache_misses, 0);
        assert_eq!(stats.cache_hit_rate, 100.0);
    }

    #[test]
    fn test_parse_stats_rejects_short_batch() {
        assert!(parse_stats(&[CacheReply::Nil]).is_err());
    }
}
