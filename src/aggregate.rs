use crate::reader::GkgRecord;
use std::collections::BTreeMap;

/// Components of a GKG tone tuple: `AvgTone,Pos,Neg,Polarity,ARD,SGRD`.
///
/// Only the first four positions are read. Components that are not finite
/// numbers are kept as `None` rather than coerced to zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneTuple {
    pub average: Option<f64>,
    pub positive: Option<f64>,
    pub negative: Option<f64>,
    pub polarity: Option<f64>,
}

/// Splits a raw tone field. Returns `None` when it has fewer than four parts.
pub fn parse_tone(raw: &str) -> Option<ToneTuple> {
    let mut parts = raw.split(',');
    let mut next = || parts.next().map(parse_component);
    let tone = ToneTuple {
        average: next()?,
        positive: next()?,
        negative: next()?,
        polarity: next()?,
    };
    Some(tone)
}

fn parse_component(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// The `YYYYMMDD` prefix of a GKG date field, if it has one.
pub fn calendar_date(raw: &str) -> Option<&str> {
    let day = raw.get(..8)?;
    day.bytes().all(|b| b.is_ascii_digit()).then_some(day)
}

/// One sink row: the reduction of every relevant record sharing a date.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyAggregate {
    pub date: String,
    /// Mean average tone.
    pub sentiment: Option<f64>,
    /// Sample standard deviation of average tone; undefined below two values.
    pub disagreement: Option<f64>,
    /// Mean polarity.
    pub volatility: Option<f64>,
    pub volume: usize,
}

impl DailyAggregate {
    pub fn to_record(&self) -> [String; 5] {
        [
            self.date.clone(),
            format_value(self.sentiment),
            format_value(self.disagreement),
            format_value(self.volatility),
            self.volume.to_string(),
        ]
    }
}

/// Shortest round-trip digits in plain positional notation, keeping a
/// trailing `.0` on whole numbers. Never switches to exponent form.
/// Undefined values become an empty cell.
pub fn format_value(value: Option<f64>) -> String {
    value
        .map(|v| {
            let mut text = v.to_string();
            if v.is_finite() && !text.contains('.') {
                text.push_str(".0");
            }
            text
        })
        .unwrap_or_default()
}

#[derive(Debug, Default, PartialEq)]
pub struct Aggregation {
    pub rows: Vec<DailyAggregate>,
    /// Records dropped for an unusable date or tone field.
    pub malformed: usize,
}

/// Streaming mean/variance (Welford) plus a plain mean for polarity.
#[derive(Debug, Default)]
struct DayAccumulator {
    volume: usize,
    tone_n: usize,
    tone_mean: f64,
    tone_m2: f64,
    polarity_n: usize,
    polarity_sum: f64,
}

impl DayAccumulator {
    fn push(&mut self, tone: &ToneTuple) {
        self.volume += 1;
        if let Some(avg) = tone.average {
            self.tone_n += 1;
            let delta = avg - self.tone_mean;
            self.tone_mean += delta / self.tone_n as f64;
            self.tone_m2 += delta * (avg - self.tone_mean);
        }
        if let Some(polarity) = tone.polarity {
            self.polarity_n += 1;
            self.polarity_sum += polarity;
        }
    }

    fn finish(self, date: String) -> DailyAggregate {
        let sentiment = (self.tone_n > 0).then_some(self.tone_mean);
        let disagreement = (self.tone_n > 1)
            .then(|| (self.tone_m2 / (self.tone_n - 1) as f64).sqrt());
        let volatility =
            (self.polarity_n > 0).then(|| self.polarity_sum / self.polarity_n as f64);
        DailyAggregate {
            date,
            sentiment,
            disagreement,
            volatility,
            volume: self.volume,
        }
    }
}

/// Reduces one file's relevant records into one row per calendar date,
/// ordered by date. Cross-file merging is left to the consumer of the sink.
pub fn aggregate_daily(records: &[GkgRecord]) -> Aggregation {
    let mut days: BTreeMap<&str, DayAccumulator> = BTreeMap::new();
    let mut malformed = 0;

    for record in records {
        let (Some(date), Some(tone)) = (calendar_date(&record.date), parse_tone(&record.tone))
        else {
            malformed += 1;
            continue;
        };
        days.entry(date).or_default().push(&tone);
    }

    let rows = days
        .into_iter()
        .map(|(date, acc)| acc.finish(date.to_string()))
        .collect();
    Aggregation { rows, malformed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str, tone: &str) -> GkgRecord {
        GkgRecord {
            date: date.to_string(),
            source: String::new(),
            themes: "ECON_STOCKMARKET;".to_string(),
            tone: tone.to_string(),
            organizations: String::new(),
        }
    }

    #[test]
    fn tone_needs_four_components() {
        assert_eq!(parse_tone("1,2,3"), None);
        assert_eq!(parse_tone(""), None);
        let tone = parse_tone("5.0,2,1,3.0").expect("four parts");
        assert_eq!(tone.average, Some(5.0));
        assert_eq!(tone.polarity, Some(3.0));
    }

    #[test]
    fn non_numeric_components_are_missing_not_zero() {
        let tone = parse_tone("abc,2,1,inf,0,0").expect("six parts");
        assert_eq!(tone.average, None);
        assert_eq!(tone.positive, Some(2.0));
        assert_eq!(tone.polarity, None);
    }

    #[test]
    fn values_are_written_without_exponents() {
        assert_eq!(format_value(Some(5.0)), "5.0");
        assert_eq!(format_value(Some(-3.25)), "-3.25");
        assert_eq!(format_value(Some(1e-7)), "0.0000001");
        assert_eq!(format_value(Some(2.5e17)), "250000000000000000.0");
        assert_eq!(format_value(None), "");
    }

    #[test]
    fn calendar_date_takes_the_day_prefix() {
        assert_eq!(calendar_date("20150101"), Some("20150101"));
        assert_eq!(calendar_date("20150218230000"), Some("20150218"));
        assert_eq!(calendar_date("2015-01-01"), None);
        assert_eq!(calendar_date("2015"), None);
    }

    #[test]
    fn one_row_per_date_and_counts_sum_to_input() {
        let records = vec![
            record("20150101", "1,0,0,2"),
            record("20150101120000", "3,0,0,4"),
            record("20150102", "-1,0,0,1"),
            record("20150103", "2,0,0,1"),
            record("20150103", "2,0,0,1"),
        ];
        let agg = aggregate_daily(&records);
        assert_eq!(agg.malformed, 0);
        assert_eq!(agg.rows.len(), 3);
        assert_eq!(agg.rows.iter().map(|r| r.volume).sum::<usize>(), records.len());

        let first = &agg.rows[0];
        assert_eq!(first.date, "20150101");
        assert_eq!(first.sentiment, Some(2.0));
        assert_eq!(first.volatility, Some(3.0));
        let sd = first.disagreement.expect("two values");
        assert!((sd - 2.0_f64.sqrt()).abs() < 1e-12);

        assert_eq!(agg.rows[2].disagreement, Some(0.0));
    }

    #[test]
    fn single_record_has_undefined_disagreement() {
        let agg = aggregate_daily(&[record("20150101", "5.0,2,1,3.0,0,0")]);
        assert_eq!(
            agg.rows,
            vec![DailyAggregate {
                date: "20150101".to_string(),
                sentiment: Some(5.0),
                disagreement: None,
                volatility: Some(3.0),
                volume: 1,
            }]
        );
        assert_eq!(agg.rows[0].to_record(), ["20150101", "5.0", "", "3.0", "1"]);
    }

    #[test]
    fn missing_tone_values_still_count_toward_volume() {
        let agg = aggregate_daily(&[record("20150101", "x,0,0,y"), record("20150101", "4,0,0,2")]);
        let row = &agg.rows[0];
        assert_eq!(row.volume, 2);
        assert_eq!(row.sentiment, Some(4.0));
        assert_eq!(row.disagreement, None);
        assert_eq!(row.volatility, Some(2.0));
    }

    #[test]
    fn short_tone_or_bad_date_drops_the_record() {
        let agg = aggregate_daily(&[record("20150101", "1,2"), record("junk", "1,2,3,4")]);
        assert!(agg.rows.is_empty());
        assert_eq!(agg.malformed, 2);
    }
}
