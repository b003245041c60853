//! OHLCV resampling into coarser fixed-width bars.
//!
//! Buckets are aligned to the Unix epoch (midnight UTC), so bucket
//! boundaries do not depend on where the input happens to start. That makes
//! resampling deterministic and idempotent: a series already aligned to the
//! target width maps every bar onto its own bucket.

use chrono::DateTime;

use super::provider::DataError;
use crate::domain::{BarKey, PriceBar, PriceSeries};

/// Aggregate `series` (bars of `source_minutes`) into `target_minutes` bars.
///
/// Per bucket: first open, max high, min low, last close, summed volume.
/// The bucket key is the bucket start. Fails with
/// [`DataError::NonIntegerResampleRatio`] unless `target_minutes` is a
/// positive integer multiple of `source_minutes`.
pub fn resample(
    series: &PriceSeries,
    target_minutes: u32,
    source_minutes: u32,
) -> Result<PriceSeries, DataError> {
    if source_minutes == 0
        || target_minutes < source_minutes
        || target_minutes % source_minutes != 0
    {
        return Err(DataError::NonIntegerResampleRatio {
            target_minutes,
            source_minutes,
        });
    }
    if target_minutes == source_minutes {
        return Ok(series.clone());
    }

    let width = i64::from(target_minutes);
    let mut out = PriceSeries::new(series.kind());
    let mut current: Option<(i64, PriceBar)> = None;

    for (key, bar) in series.iter() {
        let minute = key.timestamp().and_utc().timestamp().div_euclid(60);
        let bucket = minute.div_euclid(width) * width;

        match current.as_mut() {
            Some((start, agg)) if *start == bucket => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
            }
            _ => {
                if let Some((start, agg)) = current.take() {
                    push_bucket(&mut out, start, agg)?;
                }
                current = Some((bucket, *bar));
            }
        }
    }
    if let Some((start, agg)) = current {
        push_bucket(&mut out, start, agg)?;
    }

    Ok(out)
}

fn push_bucket(out: &mut PriceSeries, start_minute: i64, bar: PriceBar) -> Result<(), DataError> {
    let at = DateTime::from_timestamp(start_minute * 60, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| DataError::UnexpectedUpstreamShape {
            provider: "resampler".into(),
            message: format!("bucket start out of range: minute {start_minute}"),
        })?;
    out.insert(BarKey::for_kind(at, out.kind()), bar);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BarKind;
    use chrono::{Duration, NaiveDate};

    fn hourly(n: usize, start_hour: u32) -> PriceSeries {
        let base = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(start_hour, 0, 0)
            .unwrap();
        PriceSeries::from_bars(
            BarKind::Intraday,
            (0..n).map(|i| {
                let close = 100.0 + i as f64;
                (
                    BarKey::intraday(base + Duration::hours(i as i64)),
                    PriceBar {
                        open: close - 0.5,
                        high: close + 1.0 + (i % 3) as f64,
                        low: close - 1.0 - (i % 2) as f64,
                        close,
                        volume: 10.0 * (i + 1) as f64,
                    },
                )
            }),
        )
    }

    #[test]
    fn hourly_into_four_hour_buckets() {
        let s = hourly(8, 0);
        let r = resample(&s, 240, 60).unwrap();
        assert_eq!(r.len(), 2);

        let cols = s.columns();
        let (k0, b0) = r.iter().next().unwrap();
        assert_eq!(k0.as_str(), "2024-01-02 00:00:00");
        assert_eq!(b0.open, cols.opens[0]);
        assert_eq!(b0.close, cols.closes[3]);
        assert_eq!(b0.high, cols.highs[..4].iter().cloned().fold(f64::MIN, f64::max));
        assert_eq!(b0.low, cols.lows[..4].iter().cloned().fold(f64::MAX, f64::min));
        assert_eq!(b0.volume, 10.0 + 20.0 + 30.0 + 40.0);
    }

    #[test]
    fn buckets_align_to_day_start_not_first_bar() {
        // First bar at 02:00 → lands in the 00:00 bucket with bars 02:00, 03:00
        let s = hourly(6, 2);
        let r = resample(&s, 240, 60).unwrap();
        let keys: Vec<&str> = r.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["2024-01-02 00:00:00", "2024-01-02 04:00:00"]);
        assert_eq!(r.iter().next().unwrap().1.volume, 10.0 + 20.0);
    }

    #[test]
    fn ratio_one_returns_identical_series() {
        let s = hourly(5, 0);
        assert_eq!(resample(&s, 60, 60).unwrap(), s);
    }

    #[test]
    fn resampling_twice_keeps_boundaries() {
        let s = hourly(24, 0);
        let once = resample(&s, 240, 60).unwrap();
        // Aligned 4h bars fed back through the 60m → 240m path stay put
        let twice = resample(&once, 240, 60).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn non_integer_ratio_fails() {
        let s = hourly(4, 0);
        assert!(matches!(
            resample(&s, 90, 60),
            Err(DataError::NonIntegerResampleRatio {
                target_minutes: 90,
                source_minutes: 60
            })
        ));
        assert!(resample(&s, 30, 60).is_err());
        assert!(resample(&s, 60, 0).is_err());
    }
}
