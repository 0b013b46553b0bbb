//! Chunk planner.
//!
//! Splits a requested year range into consecutive, non-overlapping chunks
//! small enough that the archive's per-query result cap is not reached.
//! Boundaries are fixed calendar units; they are only refined after the
//! fact when the executor sees a chunk come back full.

use crate::error::PipelineError;
use crate::models::{month_name, Chunk, Granularity};
use chrono::{Datelike, NaiveDate};

/// Three-letter month abbreviations used in chunk names.
const MONTH_ABBREV: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Plan the chunks covering `[start_year, end_year]` inclusive.
pub fn plan_chunks(
    start_year: i32,
    end_year: i32,
    granularity: Granularity,
) -> Result<Vec<Chunk>, PipelineError> {
    if start_year > end_year {
        return Err(PipelineError::InvalidRange {
            start: start_year,
            end: end_year,
        });
    }

    ymd(start_year, 1, 1)?;
    ymd(end_year, 12, 31)?;

    let years = usize::try_from(i64::from(end_year) - i64::from(start_year) + 1)
        .map_err(|_| PipelineError::YearOutOfRange(end_year))?;
    let mut chunks = Vec::with_capacity(granularity.chunks_per_year() * years);
    for year in start_year..=end_year {
        chunks.extend(chunks_for_year(year, granularity)?);
    }

    Ok(chunks)
}

impl Chunk {
    /// Re-partition this chunk at the next finer granularity.
    ///
    /// Returns `None` when the chunk is already at the finest unit.
    pub fn split(&self) -> Option<Vec<Chunk>> {
        let finer = self.granularity.finer()?;
        let mut parts = Vec::new();

        for year in self.start.year()..=self.end.year() {
            let year_chunks = chunks_for_year(year, finer).ok()?;
            parts.extend(
                year_chunks
                    .into_iter()
                    .filter(|c| c.start >= self.start && c.end <= self.end),
            );
        }

        Some(parts)
    }
}

fn chunks_for_year(year: i32, granularity: Granularity) -> Result<Vec<Chunk>, PipelineError> {
    let mut chunks = Vec::with_capacity(granularity.chunks_per_year());

    match granularity {
        Granularity::Yearly => {
            chunks.push(Chunk {
                name: year.to_string(),
                label: year.to_string(),
                start: ymd(year, 1, 1)?,
                end: ymd(year, 12, 31)?,
                granularity,
            });
        }
        Granularity::Quarterly => {
            for quarter in 0..4u32 {
                let first = quarter * 3 + 1;
                let last = first + 2;
                chunks.push(Chunk {
                    name: format!("{}_{}_{}", year, abbrev(first), abbrev(last)),
                    label: format!("{}-{} {}", month_name(first), month_name(last), year),
                    start: ymd(year, first, 1)?,
                    end: last_day_of_month(year, last)?,
                    granularity,
                });
            }
        }
        Granularity::Monthly => {
            for month in 1..=12u32 {
                chunks.push(Chunk {
                    name: format!("{}_{}", year, abbrev(month)),
                    label: format!("{} {}", month_name(month), year),
                    start: ymd(year, month, 1)?,
                    end: last_day_of_month(year, month)?,
                    granularity,
                });
            }
        }
        Granularity::HalfMonthly => {
            for month in 1..=12u32 {
                let last = last_day_of_month(year, month)?;
                for (from, to) in [(1, 15), (16, last.day())] {
                    chunks.push(Chunk {
                        name: format!("{}_{}_{:02}_{:02}", year, abbrev(month), from, to),
                        label: format!("{} {}-{} {}", month_name(month), from, to, year),
                        start: ymd(year, month, from)?,
                        end: ymd(year, month, to)?,
                        granularity,
                    });
                }
            }
        }
    }

    Ok(chunks)
}

fn abbrev(month: u32) -> &'static str {
    MONTH_ABBREV[(month - 1) as usize]
}

fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate, PipelineError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or(PipelineError::YearOutOfRange(year))
}

fn last_day_of_month(year: i32, month: u32) -> Result<NaiveDate, PipelineError> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    ymd(next_year, next_month, 1)?
        .pred_opt()
        .ok_or(PipelineError::YearOutOfRange(year))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashSet;

    fn assert_contiguous(chunks: &[Chunk], start_year: i32, end_year: i32) {
        assert_eq!(chunks[0].start, NaiveDate::from_ymd_opt(start_year, 1, 1).unwrap());
        assert_eq!(
            chunks.last().unwrap().end,
            NaiveDate::from_ymd_opt(end_year, 12, 31).unwrap()
        );
        for pair in chunks.windows(2) {
            assert!(pair[0].start <= pair[0].end);
            assert_eq!(pair[0].end + Duration::days(1), pair[1].start);
        }
    }

    #[test]
    fn test_quarterly_plan_covers_range() {
        for (y0, y1) in [(1870, 1870), (1870, 1871), (1870, 1874), (1899, 1901)] {
            let chunks = plan_chunks(y0, y1, Granularity::Quarterly).unwrap();
            assert_eq!(chunks.len(), 4 * (y1 - y0 + 1) as usize);
            assert_contiguous(&chunks, y0, y1);
        }
    }

    #[test]
    fn test_every_day_covered_once() {
        let chunks = plan_chunks(1872, 1872, Granularity::HalfMonthly).unwrap();
        let mut day = NaiveDate::from_ymd_opt(1872, 1, 1).unwrap();
        while day.year() == 1872 {
            let covering = chunks.iter().filter(|c| c.contains(day)).count();
            assert_eq!(covering, 1, "{} covered {} times", day, covering);
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_quarterly_names_and_labels() {
        let chunks = plan_chunks(1870, 1870, Granularity::Quarterly).unwrap();
        let names: Vec<_> = chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["1870_Jan_Mar", "1870_Apr_Jun", "1870_Jul_Sep", "1870_Oct_Dec"]
        );
        assert_eq!(chunks[0].label, "January-March 1870");
        assert_eq!(chunks[3].label, "October-December 1870");
        assert_eq!(chunks[3].year_range(), [1870, 1870]);
    }

    #[test]
    fn test_names_unique_across_granularities() {
        for granularity in [
            Granularity::Yearly,
            Granularity::Quarterly,
            Granularity::Monthly,
            Granularity::HalfMonthly,
        ] {
            let chunks = plan_chunks(1870, 1872, granularity).unwrap();
            let names: HashSet<_> = chunks.iter().map(|c| c.name.clone()).collect();
            assert_eq!(names.len(), chunks.len());
            assert_contiguous(&chunks, 1870, 1872);
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        let a = plan_chunks(1870, 1874, Granularity::Monthly).unwrap();
        let b = plan_chunks(1870, 1874, Granularity::Monthly).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_leap_year_february() {
        let chunks = plan_chunks(1872, 1872, Granularity::HalfMonthly).unwrap();
        let late_feb = chunks.iter().find(|c| c.name == "1872_Feb_16_29").unwrap();
        assert_eq!(late_feb.end, NaiveDate::from_ymd_opt(1872, 2, 29).unwrap());
        assert_eq!(late_feb.label, "February 16-29 1872");
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = plan_chunks(1875, 1870, Granularity::Quarterly).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidRange {
                start: 1875,
                end: 1870
            }
        ));
    }

    #[test]
    fn test_extreme_years_rejected() {
        let err = plan_chunks(i32::MIN, i32::MAX, Granularity::Quarterly).unwrap_err();
        assert!(matches!(err, PipelineError::YearOutOfRange(i32::MIN)));

        let err = plan_chunks(1870, i32::MAX, Granularity::Yearly).unwrap_err();
        assert!(matches!(err, PipelineError::YearOutOfRange(i32::MAX)));
    }

    #[test]
    fn test_split_quarter_into_months() {
        let quarter = plan_chunks(1870, 1870, Granularity::Quarterly).unwrap()[1].clone();
        let months = quarter.split().unwrap();
        let names: Vec<_> = months.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["1870_Apr", "1870_May", "1870_Jun"]);
        assert_eq!(months[0].start, quarter.start);
        assert_eq!(months[2].end, quarter.end);
    }

    #[test]
    fn test_split_stops_at_half_month() {
        let month = plan_chunks(1870, 1870, Granularity::Monthly).unwrap()[0].clone();
        let halves = month.split().unwrap();
        assert_eq!(halves.len(), 2);
        assert!(halves[0].split().is_none());
    }
}
