use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while_m_n},
    character::complete::{char, digit1, one_of, satisfy},
    combinator::{all_consuming, map, map_res, opt, value},
    multi::many1,
    sequence::{delimited, preceded},
};
use crate::core::error::{Error, Result};

pub const DEFAULT_DATE_FORMAT: &str = "strict_date_optional_time||epoch_millis";

/// Formats tried, in order, when a string is seen for an unmapped field.
pub const DYNAMIC_DATE_FORMATS: &[&str] = &[
    "strict_date_optional_time",
    "yyyy/MM/dd HH:mm:ss||yyyy/MM/dd",
];

/// A parsed instant plus whether the input carried a time of day.
/// Date-only bounds are rounded to whole days by range queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDate {
    pub value: DateTime<Utc>,
    pub has_time: bool,
}

impl ParsedDate {
    pub fn millis(&self) -> i64 {
        self.value.timestamp_millis()
    }

    /// Last millisecond of the day this date starts.
    pub fn end_of_day(&self) -> DateTime<Utc> {
        self.value + Duration::days(1) - Duration::milliseconds(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FormatPart {
    StrictDateOptionalTime,
    EpochMillis,
    EpochSecond,
    Pattern(JavaPattern),
}

#[derive(Debug, Clone, PartialEq)]
struct JavaPattern {
    chrono: String,
    has_date: bool,
    has_time: bool,
    has_offset: bool,
}

/// Date format built from `||`-separated alternatives: named formats or Java-style patterns.
#[derive(Debug, Clone, PartialEq)]
pub struct DateFormat {
    pub spec: String,
    parts: Vec<FormatPart>,
}

impl Default for DateFormat {
    fn default() -> Self {
        DateFormat {
            spec: DEFAULT_DATE_FORMAT.to_string(),
            parts: vec![FormatPart::StrictDateOptionalTime, FormatPart::EpochMillis],
        }
    }
}

impl DateFormat {
    pub fn parse_spec(spec: &str) -> Result<Self> {
        let mut parts = Vec::new();
        for alternative in spec.split("||") {
            let alternative = alternative.trim();
            let part = match alternative {
                "strict_date_optional_time" | "date_optional_time" => FormatPart::StrictDateOptionalTime,
                "epoch_millis" => FormatPart::EpochMillis,
                "epoch_second" => FormatPart::EpochSecond,
                "strict_date" | "date" | "strict_year_month_day" | "year_month_day" => {
                    FormatPart::Pattern(compile_pattern("yyyy-MM-dd")?)
                }
                "basic_date" => FormatPart::Pattern(compile_pattern("yyyyMMdd")?),
                "strict_date_time" | "date_time" => {
                    FormatPart::Pattern(compile_pattern("yyyy-MM-dd'T'HH:mm:ss.SSSXXX")?)
                }
                "strict_date_hour_minute_second" | "date_hour_minute_second" => {
                    FormatPart::Pattern(compile_pattern("yyyy-MM-dd'T'HH:mm:ss")?)
                }
                pattern => FormatPart::Pattern(compile_pattern(pattern)?),
            };
            parts.push(part);
        }
        Ok(DateFormat {
            spec: spec.to_string(),
            parts,
        })
    }

    /// Parses with the first alternative that accepts the input. Inputs without an
    /// explicit offset are read in `time_zone`, or UTC when none is given.
    pub fn parse(&self, input: &str, time_zone: Option<FixedOffset>) -> Option<ParsedDate> {
        let zone = time_zone.unwrap_or_else(utc_offset);
        self.parts.iter().find_map(|part| match part {
            FormatPart::StrictDateOptionalTime => parse_iso(input, zone),
            FormatPart::EpochMillis => input
                .parse::<i64>()
                .ok()
                .and_then(from_epoch_millis)
                .map(|value| ParsedDate { value, has_time: true }),
            FormatPart::EpochSecond => input
                .parse::<i64>()
                .ok()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .map(|value| ParsedDate { value, has_time: true }),
            FormatPart::Pattern(pattern) => parse_with_pattern(input, pattern, zone),
        })
    }

    /// Whether bare integers are accepted as epoch milliseconds.
    pub fn accepts_epoch_millis(&self) -> bool {
        self.parts.contains(&FormatPart::EpochMillis)
    }
}

pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Parses `Z`, `UTC`, `+01:00`, `-0500` style zones.
pub fn parse_time_zone(input: &str) -> Result<FixedOffset> {
    if input.eq_ignore_ascii_case("utc") {
        return Ok(utc_offset());
    }
    let seconds = all_consuming(offset_seconds)
        .parse(input)
        .map(|(_, seconds)| seconds)
        .map_err(|_| Error::query(format!("invalid time_zone [{}]", input)))?;
    FixedOffset::east_opt(seconds)
        .ok_or_else(|| Error::query(format!("time_zone out of range [{}]", input)))
}

fn two_digits(input: &str) -> IResult<&str, u32> {
    map_res(take_while_m_n(2, 2, |c: char| c.is_ascii_digit()), |s: &str| s.parse::<u32>())
        .parse(input)
}

fn four_digits(input: &str) -> IResult<&str, i32> {
    map_res(take_while_m_n(4, 4, |c: char| c.is_ascii_digit()), |s: &str| s.parse::<i32>())
        .parse(input)
}

fn offset_seconds(input: &str) -> IResult<&str, i32> {
    alt((
        value(0, char('Z')),
        map(
            (one_of("+-"), two_digits, opt(char(':')), two_digits),
            |(sign, hours, _, minutes)| {
                let seconds = (hours * 3600 + minutes * 60) as i32;
                if sign == '-' { -seconds } else { seconds }
            },
        ),
    ))
    .parse(input)
}

fn iso_date(input: &str) -> IResult<&str, (i32, u32, u32)> {
    (four_digits, preceded(char('-'), two_digits), preceded(char('-'), two_digits)).parse(input)
}

/// `HH:mm[:ss[.fraction]]`; the fraction is returned in nanoseconds.
fn iso_time(input: &str) -> IResult<&str, (u32, u32, u32, u32)> {
    map(
        (
            two_digits,
            preceded(char(':'), two_digits),
            opt(preceded(char(':'), two_digits)),
            opt(preceded(alt((char('.'), char(','))), digit1)),
        ),
        |(hour, minute, second, fraction): (u32, u32, Option<u32>, Option<&str>)| {
            let nanos = fraction
                .map(|digits| {
                    let mut padded: String = digits.chars().take(9).collect();
                    while padded.len() < 9 {
                        padded.push('0');
                    }
                    padded.parse::<u32>().unwrap_or(0)
                })
                .unwrap_or(0);
            (hour, minute, second.unwrap_or(0), nanos)
        },
    )
    .parse(input)
}

type IsoParts = ((i32, u32, u32), Option<(char, (u32, u32, u32, u32), Option<i32>)>);

fn iso_date_optional_time(input: &str) -> IResult<&str, IsoParts> {
    (iso_date, opt((char('T'), iso_time, opt(offset_seconds)))).parse(input)
}

fn parse_iso(input: &str, zone: FixedOffset) -> Option<ParsedDate> {
    let (_, ((year, month, day), time)) = all_consuming(iso_date_optional_time).parse(input).ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let (naive_time, offset, has_time) = match time {
        Some((_, (h, m, s, nanos), offset)) => {
            (NaiveTime::from_hms_nano_opt(h, m, s, nanos)?, offset, true)
        }
        None => (NaiveTime::from_hms_opt(0, 0, 0)?, None, false),
    };
    let zone = match offset {
        Some(seconds) => FixedOffset::east_opt(seconds)?,
        None => zone,
    };
    let value = zone
        .from_local_datetime(&NaiveDateTime::new(date, naive_time))
        .single()?
        .with_timezone(&Utc);
    Some(ParsedDate { value, has_time })
}

#[derive(Debug, Clone, PartialEq)]
enum PatternToken {
    Year,
    ShortYear,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millis,
    Offset,
    Literal(String),
}

fn pattern_token(input: &str) -> IResult<&str, PatternToken> {
    alt((
        value(PatternToken::Year, alt((tag("yyyy"), tag("uuuu")))),
        value(PatternToken::ShortYear, tag("yy")),
        value(PatternToken::Month, tag("MM")),
        value(PatternToken::Day, tag("dd")),
        value(PatternToken::Hour, tag("HH")),
        value(PatternToken::Minute, tag("mm")),
        value(PatternToken::Second, tag("ss")),
        value(PatternToken::Millis, tag("SSS")),
        value(PatternToken::Offset, alt((tag("XXX"), tag("xxx"), tag("ZZ"), tag("Z")))),
        map(
            delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
            |literal: &str| PatternToken::Literal(literal.to_string()),
        ),
        map(
            satisfy(|c| !c.is_ascii_alphabetic() && c != '\''),
            |c| PatternToken::Literal(c.to_string()),
        ),
    ))
    .parse(input)
}

/// Translates a Java-style pattern such as `yyyy/MM/dd HH:mm:ss` into a chrono format.
fn compile_pattern(pattern: &str) -> Result<JavaPattern> {
    let (_, tokens) = all_consuming(many1(pattern_token))
        .parse(pattern)
        .map_err(|_| Error::invalid_mapping(format!("unsupported date format [{}]", pattern)))?;

    let mut compiled = JavaPattern {
        chrono: String::new(),
        has_date: false,
        has_time: false,
        has_offset: false,
    };
    for token in tokens {
        let fragment = match token {
            PatternToken::Year => {
                compiled.has_date = true;
                "%Y".to_string()
            }
            PatternToken::ShortYear => {
                compiled.has_date = true;
                "%y".to_string()
            }
            PatternToken::Month => "%m".to_string(),
            PatternToken::Day => "%d".to_string(),
            PatternToken::Hour => {
                compiled.has_time = true;
                "%H".to_string()
            }
            PatternToken::Minute => "%M".to_string(),
            PatternToken::Second => "%S".to_string(),
            PatternToken::Millis => "%3f".to_string(),
            PatternToken::Offset => {
                compiled.has_offset = true;
                "%:z".to_string()
            }
            PatternToken::Literal(text) => text.replace('%', "%%"),
        };
        compiled.chrono.push_str(&fragment);
    }

    if !compiled.has_date {
        return Err(Error::invalid_mapping(format!(
            "date format [{}] has no year component",
            pattern
        )));
    }
    Ok(compiled)
}

fn parse_with_pattern(input: &str, pattern: &JavaPattern, zone: FixedOffset) -> Option<ParsedDate> {
    if pattern.has_offset {
        let value = DateTime::parse_from_str(input, &pattern.chrono).ok()?.with_timezone(&Utc);
        return Some(ParsedDate { value, has_time: true });
    }
    let naive = if pattern.has_time {
        NaiveDateTime::parse_from_str(input, &pattern.chrono).ok()?
    } else {
        NaiveDate::parse_from_str(input, &pattern.chrono).ok()?.and_hms_opt(0, 0, 0)?
    };
    let value = zone.from_local_datetime(&naive).single()?.with_timezone(&Utc);
    Some(ParsedDate {
        value,
        has_time: pattern.has_time,
    })
}
