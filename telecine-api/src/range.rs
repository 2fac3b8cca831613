//! HTTP Range resolution and the aligned slice-window math handed to
//! the byte streamer.

use thiserror::Error;

/// Upper bound on upstream read size; small files use a tenth of their
/// size so short requests stay cheap.
pub const MAX_CHUNK_SIZE: u64 = 1024 * 1024;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    /// The requested window lies outside the file.
    #[error("range not satisfiable")]
    Unsatisfiable,
    /// The header failed to parse.
    #[error("malformed range header")]
    Malformed,
}

/// Resolved byte window of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteWindow {
    pub from: u64,
    pub until: u64,
    /// Whether a Range header was present (206 vs 200).
    pub partial: bool,
}

/// Resolve an optional `Range: bytes=FROM-UNTIL?` header against the
/// file size. A missing bound defaults to the end of the file. An end
/// past `file_size` is unsatisfiable, but an end of exactly
/// `file_size` is accepted and clamped to the last byte.
pub fn resolve_range(header: Option<&str>, file_size: u64) -> Result<ByteWindow, RangeError> {
    if file_size == 0 {
        return Err(RangeError::Unsatisfiable);
    }

    let Some(header) = header else {
        return Ok(ByteWindow {
            from: 0,
            until: file_size - 1,
            partial: false,
        });
    };

    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or(RangeError::Malformed)?;
    let (from_raw, until_raw) = spec.split_once('-').ok_or(RangeError::Malformed)?;

    let from: u64 = from_raw.trim().parse().map_err(|_| RangeError::Malformed)?;
    let until: u64 = if until_raw.trim().is_empty() {
        file_size - 1
    } else {
        until_raw.trim().parse().map_err(|_| RangeError::Malformed)?
    };

    // Validation happens before the clamp, so `from == until ==
    // file_size` passes and degenerates to an empty window below.
    if from > until || until > file_size {
        return Err(RangeError::Unsatisfiable);
    }

    Ok(ByteWindow {
        from,
        until: until.min(file_size - 1),
        partial: true,
    })
}

/// Aligned chunk window covering a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceWindow {
    pub chunk_size: u64,
    /// First upstream read offset, aligned down to `chunk_size`.
    pub offset: u64,
    /// Bytes trimmed off the front of the first chunk.
    pub first_cut: usize,
    /// Bytes kept from the final chunk.
    pub last_cut: usize,
    pub req_length: u64,
    pub part_count: u32,
}

/// Compute the aligned window for a resolved range.
///
/// The clamped degenerate case (`from` one past the last byte) yields
/// a zero-length window: no parts, `req_length` 0.
#[must_use]
pub fn slice_window(window: ByteWindow, file_size: u64) -> SliceWindow {
    let chunk_size = MAX_CHUNK_SIZE.min(file_size / 10).max(1);
    let offset = window.from - (window.from % chunk_size);
    let first_cut = (window.from - offset) as usize;
    let last_cut = (window.until % chunk_size + 1) as usize;
    let req_length = (window.until + 1).saturating_sub(window.from);
    // Inclusive count of chunk indices touched by [from, until].
    let part_count = (window.until / chunk_size + 1).saturating_sub(offset / chunk_size) as u32;

    SliceWindow {
        chunk_size,
        offset,
        first_cut,
        last_cut,
        req_length,
        part_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIVE_MIB: u64 = 5 * 1024 * 1024;

    #[test]
    fn absent_header_is_whole_file() {
        let window = resolve_range(None, FIVE_MIB).unwrap();
        assert_eq!(window.from, 0);
        assert_eq!(window.until, FIVE_MIB - 1);
        assert!(!window.partial);
    }

    #[test]
    fn open_ended_range_reaches_end_of_file() {
        let window = resolve_range(Some("bytes=1000-"), FIVE_MIB).unwrap();
        assert_eq!(window.from, 1000);
        assert_eq!(window.until, FIVE_MIB - 1);
        assert!(window.partial);
    }

    #[test]
    fn bounded_range_is_inclusive() {
        let window = resolve_range(Some("bytes=0-1048575"), FIVE_MIB).unwrap();
        assert_eq!(window.from, 0);
        assert_eq!(window.until, 1_048_575);
    }

    #[test]
    fn out_of_range_windows_are_unsatisfiable() {
        assert_eq!(
            resolve_range(Some("bytes=6000000-"), FIVE_MIB),
            Err(RangeError::Unsatisfiable)
        );
        assert_eq!(
            resolve_range(Some("bytes=0-5242881"), FIVE_MIB),
            Err(RangeError::Unsatisfiable)
        );
        assert_eq!(
            resolve_range(Some("bytes=200-100"), FIVE_MIB),
            Err(RangeError::Unsatisfiable)
        );
    }

    #[test]
    fn end_equal_to_file_size_is_clamped_to_last_byte() {
        // "bytes=0-5242880" on a 5 MiB file is served as the whole
        // file, not rejected.
        let window = resolve_range(Some("bytes=0-5242880"), FIVE_MIB).unwrap();
        assert_eq!(window.from, 0);
        assert_eq!(window.until, FIVE_MIB - 1);
        assert!(window.partial);

        let slice = slice_window(window, FIVE_MIB);
        assert_eq!(slice.req_length, FIVE_MIB);
    }

    #[test]
    fn clamped_window_past_the_last_byte_is_empty() {
        // from == until == file_size passes validation and clamps to a
        // zero-length window served with no parts.
        let window = resolve_range(Some("bytes=5242880-5242880"), FIVE_MIB).unwrap();
        assert_eq!(window.from, FIVE_MIB);
        assert_eq!(window.until, FIVE_MIB - 1);

        let slice = slice_window(window, FIVE_MIB);
        assert_eq!(slice.req_length, 0);
        assert_eq!(slice.part_count, 0);
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert_eq!(
            resolve_range(Some("bytes=abc-"), FIVE_MIB),
            Err(RangeError::Malformed)
        );
        assert_eq!(
            resolve_range(Some("octets=0-10"), FIVE_MIB),
            Err(RangeError::Malformed)
        );
        assert_eq!(
            resolve_range(Some("bytes=-500"), FIVE_MIB),
            Err(RangeError::Malformed)
        );
        assert_eq!(
            resolve_range(Some("bytes=10"), FIVE_MIB),
            Err(RangeError::Malformed)
        );
    }

    #[test]
    fn zero_size_file_is_unsatisfiable() {
        assert_eq!(resolve_range(None, 0), Err(RangeError::Unsatisfiable));
        assert_eq!(
            resolve_range(Some("bytes=0-"), 0),
            Err(RangeError::Unsatisfiable)
        );
    }

    #[test]
    fn chunk_size_is_capped_at_one_mib() {
        let window = resolve_range(None, 100 * 1024 * 1024).unwrap();
        let slice = slice_window(window, 100 * 1024 * 1024);
        assert_eq!(slice.chunk_size, MAX_CHUNK_SIZE);
    }

    #[test]
    fn small_files_use_a_tenth_with_floor_of_one() {
        let window = resolve_range(None, 100).unwrap();
        assert_eq!(slice_window(window, 100).chunk_size, 10);

        let window = resolve_range(None, 5).unwrap();
        assert_eq!(slice_window(window, 5).chunk_size, 1);
    }

    #[test]
    fn first_mib_of_five_mib_file() {
        let window = resolve_range(Some("bytes=0-1048575"), FIVE_MIB).unwrap();
        let slice = slice_window(window, FIVE_MIB);
        assert_eq!(slice.chunk_size, 524_288);
        assert_eq!(slice.offset, 0);
        assert_eq!(slice.first_cut, 0);
        assert_eq!(slice.last_cut, 524_288);
        assert_eq!(slice.req_length, 1_048_576);
        assert_eq!(slice.part_count, 2);
    }

    #[test]
    fn unaligned_window_is_trimmed_at_both_ends() {
        // 10_000-byte file → chunk 1_000. Window 2_500..=3_499 spans
        // chunks 2 and 3 with 500 trimmed at each end.
        let window = resolve_range(Some("bytes=2500-3499"), 10_000).unwrap();
        let slice = slice_window(window, 10_000);
        assert_eq!(slice.chunk_size, 1_000);
        assert_eq!(slice.offset, 2_000);
        assert_eq!(slice.first_cut, 500);
        assert_eq!(slice.last_cut, 500);
        assert_eq!(slice.req_length, 1_000);
        assert_eq!(slice.part_count, 2);
    }

    #[test]
    fn chunk_boundary_end_keeps_its_final_part() {
        // until = 2_000 is an exact chunk multiple: the window needs
        // chunk index 2 for its single byte.
        let window = resolve_range(Some("bytes=1500-2000"), 10_000).unwrap();
        let slice = slice_window(window, 10_000);
        assert_eq!(slice.part_count, 2);
        assert_eq!(slice.last_cut, 1);
        assert_eq!(slice.req_length, 501);
    }

    #[test]
    fn single_byte_window() {
        let window = resolve_range(Some("bytes=0-0"), 10_000).unwrap();
        let slice = slice_window(window, 10_000);
        assert_eq!(slice.part_count, 1);
        assert_eq!(slice.first_cut, 0);
        assert_eq!(slice.last_cut, 1);
        assert_eq!(slice.req_length, 1);
    }

    #[test]
    fn concatenated_parts_cover_exactly_the_window() {
        // Property: for every window, summing the trimmed part lengths
        // equals req_length.
        let file_size = 10_000u64;
        for (from, until) in [
            (0u64, 9_999u64),
            (0, 0),
            (999, 1_000),
            (1_000, 1_999),
            (1_500, 2_000),
            (2_500, 3_499),
            (9_999, 9_999),
            (123, 8_765),
        ] {
            let header = format!("bytes={from}-{until}");
            let window = resolve_range(Some(header.as_str()), file_size).unwrap();
            let slice = slice_window(window, file_size);

            let mut produced = 0u64;
            for part in 1..=slice.part_count {
                let chunk_start = slice.offset + u64::from(part - 1) * slice.chunk_size;
                let chunk_len = slice.chunk_size.min(file_size - chunk_start) as usize;
                let (start, end) = if slice.part_count == 1 {
                    (slice.first_cut, slice.last_cut.min(chunk_len))
                } else if part == 1 {
                    (slice.first_cut, chunk_len)
                } else if part == slice.part_count {
                    (0, slice.last_cut.min(chunk_len))
                } else {
                    (0, chunk_len)
                };
                produced += (end - start) as u64;
            }
            assert_eq!(produced, slice.req_length, "window {from}..={until}");
        }
    }
}
