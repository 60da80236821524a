//! Parsing helpers for menu text as it appears on web pages and in OCR output.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use std::sync::LazyLock;

use crate::models::{Money, ResolvedOffer};

static PRICE_WITH_CENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,4})\s?[,.]\s?(\d{2})\b").expect("price pattern compiles"));

static PRICE_WHOLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,4})\s?(?:,-|,--|\.-|€|EUR\b|Euro\b)").expect("whole price pattern compiles")
});

static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})\.\s?(\d{1,2})\.(?:\s?(\d{4}|\d{2})\b)?").expect("date pattern compiles")
});

/// Parses German price notation such as `5,90 €`, `5.90`, `6,-` or `6 EUR`.
pub fn parse_price(text: &str) -> Option<Decimal> {
    if let Some(caps) = PRICE_WITH_CENTS.captures(text) {
        let euros: i64 = caps[1].parse().ok()?;
        let cents: i64 = caps[2].parse().ok()?;
        return Some(Decimal::new(euros * 100 + cents, 2));
    }

    let caps = PRICE_WHOLE.captures(text)?;
    let euros: i64 = caps[1].parse().ok()?;
    Some(Decimal::new(euros * 100, 2))
}

/// Parses the first `dd.mm.yyyy`, `dd.mm.yy` or `dd.mm.` date in `text`.
///
/// Two digit years are taken as 20xx. Without a year the occurrence closest to `today` is
/// used, so a menu spanning new year keeps its January days in the coming year.
pub fn parse_day(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let caps = DATE.captures(text)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year = match caps.get(3) {
        Some(y) if y.as_str().len() == 2 => 2000 + y.as_str().parse::<i32>().ok()?,
        Some(y) => y.as_str().parse().ok()?,
        None => return nearest_occurrence(day, month, today),
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

fn nearest_occurrence(day: u32, month: u32, today: NaiveDate) -> Option<NaiveDate> {
    [today.year() - 1, today.year(), today.year() + 1]
        .into_iter()
        .filter_map(|year| NaiveDate::from_ymd_opt(year, month, day))
        .min_by_key(|date| (*date - today).num_days().abs())
}

/// Strips the price and leftover separators from an offer line.
pub fn clean_name(text: &str) -> String {
    let without_price = match PRICE_WITH_CENTS.find(text).or_else(|| PRICE_WHOLE.find(text)) {
        Some(m) => format!("{}{}", &text[..m.start()], &text[m.end()..]),
        None => text.to_string(),
    };

    without_price
        .replace('€', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '–' | ':' | '|' | '.' | ','))
        .trim()
        .to_string()
}

/// Turns recognised menu text into offers.
///
/// A line carrying a date opens that day; a later line carrying a price becomes an offer of
/// the open day. Lines before the first date and lines without a price are ignored.
pub fn parse_menu_text(text: &str, today: NaiveDate) -> Vec<ResolvedOffer> {
    let mut offers = Vec::new();
    let mut current_day = None;

    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if let Some(day) = parse_day(line, today) {
            current_day = Some(day);
            continue;
        }

        let Some(day) = current_day else { continue };
        let Some(amount) = parse_price(line) else { continue };

        let name = clean_name(line);
        if name.is_empty() {
            continue;
        }

        offers.push(ResolvedOffer::new(name, day, Money::eur(amount)));
    }

    offers
}
