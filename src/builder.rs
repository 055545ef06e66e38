use std::collections::BTreeMap;
use std::str::FromStr;

use tracing::debug;

use crate::parser::{RawFile, RawNzb, RawSegment};
use crate::{File, Nzb, Segment};

/// Parses a base-10 integer attribute, treating anything unusable as zero.
fn number_or_zero<T>(value: Option<&str>, attribute: &'static str) -> T
where
    T: FromStr + Default,
{
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return T::default();
    };
    value.parse().unwrap_or_else(|_| {
        debug!(attribute, value, "ignoring non-numeric attribute value");
        T::default()
    })
}

fn build_segment(raw: RawSegment) -> Segment {
    Segment {
        size: number_or_zero(raw.bytes.as_deref(), "bytes"),
        number: number_or_zero(raw.number.as_deref(), "number"),
        message_id: raw.message_id,
    }
}

fn build_file(raw: RawFile) -> File {
    File {
        poster: raw.poster.unwrap_or_default(),
        date: number_or_zero(raw.date.as_deref(), "date"),
        subject: raw.subject.unwrap_or_default(),
        groups: raw.groups,
        segments: raw.segments.into_iter().map(build_segment).collect(),
        sequence_part: 0,
    }
}

/// Reshapes a [`RawNzb`] into an [`Nzb`].
///
/// Metadata is folded into a map in document order, so a repeated key keeps
/// the last value. Files, groups and segments keep their document order.
/// Every file's [`File::sequence_part`] is `0`.
pub fn build(raw: RawNzb) -> Nzb {
    let meta: BTreeMap<String, String> = raw.meta.into_iter().map(|m| (m.key, m.value)).collect();
    let files = raw.files.into_iter().map(build_file).collect();
    Nzb { meta, files }
}
