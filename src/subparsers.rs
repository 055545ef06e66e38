use lazy_regex::{Regex, regex};

/// First capture group of `re` in `subject`, trimmed. Blank captures count as no match.
fn trimmed_group<'s>(re: &Regex, subject: &'s str) -> Option<&'s str> {
    re.captures(subject)?
        .get(1)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

/// Extract the complete name of the file with it's extension from the subject.
/// May return `None` if it fails to extract the name.
pub(crate) fn extract_filename_from_subject(subject: &str) -> Option<&str> {
    // Ordered from most specific to most general.

    // Case 1: Filename is in quotes.
    // https://github.com/sabnzbd/sabnzbd/blob/02b4a116dd4b46b2d2f33f7bbf249f2294458f2e/sabnzbd/nzbstuff.py#L104-L106
    trimmed_group(regex!(r#""(.*)""#), subject)
        // Case 2: [011/116] - Some Name.mkv yEnc (1/2401) 1720916370
        .or_else(|| {
            trimmed_group(
                regex!(r"^(?:\[|\()(?:\d+/\d+)(?:\]|\))\s-\s(.*)\syEnc\s(?:\[|\()(?:\d+/\d+)(?:\]|\))\s\d+"),
                subject,
            )
        })
        // Case 3: Something that might look like a filename.
        .or_else(|| {
            trimmed_group(
                regex!(r"\b([\w\-+()' .,]+(?:\[[\w\-/+()' .,]*][\w\-+()' .,]*)*\.[A-Za-z0-9]{2,4})\b"),
                subject,
            )
        })
}

/// Splits a filename into a stem and an extension.
/// `Path.extension()` has too many false positives, so we use a custom regex.
///
/// Returns a tuple containing the `(stem, Option<extension>)`.
pub(crate) fn split_filename_at_extension(filename: &str) -> (&str, Option<&str>) {
    let re = regex!(r"(\.[a-z]\w{2,5})$"i);

    if let Some(found) = re.find(filename) {
        // +1 skips the dot, like `Path::extension()`.
        let start = found.start();
        (&filename[..start], Some(&filename[start + 1..]))
    } else {
        (filename, None)
    }
}

/// Reads the `N` of a leading `[N/M]` or `(N/M)` file counter in a subject.
///
/// Only a counter at the very start is considered. The `(N/M)` that follows
/// `yEnc` counts segments, not files.
pub(crate) fn file_part_from_subject(subject: &str) -> Option<u32> {
    let (_, [part]) = regex!(r"^\s*[\[(](\d+)/\d+[\])]").captures(subject)?.extract();
    part.parse().ok()
}
