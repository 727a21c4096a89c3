//! `dateTime.iso8601` text forms.

use time::PrimitiveDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// `19980717T14:08:55`, the form XML-RPC peers emit.
const COMPACT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]T[hour]:[minute]:[second]");

/// `1998-07-17T14:08:55`.
const EXTENDED: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// Parses either the compact or the extended form.
pub(crate) fn parse(text: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(text, COMPACT).or_else(|_| PrimitiveDateTime::parse(text, EXTENDED))
}

pub(crate) fn format_compact(moment: PrimitiveDateTime) -> String {
    format_with(moment, COMPACT)
}

pub(crate) fn format_extended(moment: PrimitiveDateTime) -> String {
    format_with(moment, EXTENDED)
}

// Four-digit years always format; the fallback only covers out-of-range years.
fn format_with(moment: PrimitiveDateTime, format: &[BorrowedFormatItem<'_>]) -> String {
    moment.format(format).unwrap_or_else(|_| moment.to_string())
}
