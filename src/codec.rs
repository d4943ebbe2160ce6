//! Text decoders and datetime codecs shared by both archive formats.
//!
//! All timestamps surfaced by the crate are milliseconds since the Unix
//! epoch. On-disk dates that cannot be interpreted collapse to zero rather
//! than failing a mount; real images carry plenty of garbage here.

use time::{Date, Month, PrimitiveDateTime, Time};

/// Lenient UTF-8 decode; invalid sequences become replacement characters.
pub fn decode_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// UTF-16BE decode used for Joliet identifiers and volume strings.
pub fn decode_utf16be(bytes: &[u8]) -> String {
    char::decode_utf16(
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]])),
    )
    .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
    .collect()
}

/// Fallback for pre-Unicode ZIP entry names: the ASCII range passes through,
/// everything above it becomes a replacement character.
pub fn decode_cp437(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                char::REPLACEMENT_CHARACTER
            }
        })
        .collect()
}

/// Decode a 32-bit MS-DOS datetime (time in the low word, date in the high
/// word) into epoch milliseconds. Out-of-range fields clamp to the nearest
/// legal value.
pub fn msdos_datetime_ms(stamp: u32) -> i64 {
    let dos_time = (stamp & 0xFFFF) as u16;
    let dos_date = (stamp >> 16) as u16;
    let second = ((dos_time & 0x1F) as u8 * 2).min(59);
    let minute = (((dos_time >> 5) & 0x3F) as u8).min(59);
    let hour = (((dos_time >> 11) & 0x1F) as u8).min(23);
    let day = ((dos_date & 0x1F) as u8).max(1);
    let month = (((dos_date >> 5) & 0x0F) as u8).clamp(1, 12);
    let year = ((dos_date >> 9) & 0x7F) as i32 + 1980;
    calendar_ms(year, month, day, hour, minute, second)
}

/// Decode the 7-byte short-form ISO 9660 datetime carried by directory
/// records (and Rock Ridge `TF` entries). The timezone byte is ignored.
pub fn iso_short_datetime_ms(bytes: &[u8]) -> i64 {
    if bytes.len() < 6 {
        return 0;
    }
    calendar_ms(
        bytes[0] as i32 + 1900,
        bytes[1],
        bytes[2],
        bytes[3],
        bytes[4],
        bytes[5],
    )
}

/// Decode the 17-byte long-form ISO 9660 datetime: sixteen ASCII digits
/// `YYYYMMDDhhmmssCC` followed by a timezone byte (ignored).
pub fn iso_long_datetime_ms(bytes: &[u8]) -> i64 {
    if bytes.len() < 16 || !bytes[..16].iter().all(u8::is_ascii_digit) {
        return 0;
    }
    let field = |range: std::ops::Range<usize>| -> u32 {
        bytes[range].iter().fold(0, |acc, &d| acc * 10 + u32::from(d - b'0'))
    };
    let ms = calendar_ms(
        field(0..4) as i32,
        field(4..6) as u8,
        field(6..8) as u8,
        field(8..10) as u8,
        field(10..12) as u8,
        field(12..14) as u8,
    );
    ms + i64::from(field(14..16)) * 10
}

/// Calendar fields to epoch milliseconds, clamping each field into range.
fn calendar_ms(year: i32, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> i64 {
    if year < 1970 || month == 0 || day == 0 {
        return 0;
    }
    let month = match Month::try_from(month.min(12)) {
        Ok(m) => m,
        Err(_) => return 0,
    };
    let day = day.min(time::util::days_in_year_month(year, month));
    let date = match Date::from_calendar_date(year, month, day) {
        Ok(d) => d,
        Err(_) => return 0,
    };
    let time = Time::from_hms(hour.min(23), minute.min(59), second.min(59))
        .unwrap_or(Time::MIDNIGHT);
    let datetime = PrimitiveDateTime::new(date, time).assume_utc();
    datetime.unix_timestamp() * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dos_datetime_round_values() {
        // 2020-06-15 12:30:10
        let date = (40 << 9) | (6 << 5) | 15;
        let time = (12 << 11) | (30 << 5) | 5;
        let ms = msdos_datetime_ms((date as u32) << 16 | time as u32);
        assert_eq!(ms, 1_592_224_210_000);
    }

    #[test]
    fn dos_datetime_clamps_bad_fields() {
        // Month 15, day 0, second 31*2: clamps instead of failing.
        let date = (20 << 9) | (15 << 5);
        let time = 31;
        let ms = msdos_datetime_ms((date as u32) << 16 | time as u32);
        assert!(ms > 0);
    }

    #[test]
    fn iso_short_datetime() {
        // 2001-09-09 01:46:40 UTC == 1_000_000_000 seconds.
        let ms = iso_short_datetime_ms(&[101, 9, 9, 1, 46, 40, 0]);
        assert_eq!(ms, 1_000_000_000_000);
    }

    #[test]
    fn iso_long_datetime() {
        let ms = iso_long_datetime_ms(b"2001090901464005\x00");
        assert_eq!(ms, 1_000_000_000_050);
        assert_eq!(iso_long_datetime_ms(b"not-even-digits!\x00"), 0);
    }

    #[test]
    fn utf16be_decodes_joliet_names() {
        let encoded: Vec<u8> = "One.txt".encode_utf16().flat_map(u16::to_be_bytes).collect();
        assert_eq!(decode_utf16be(&encoded), "One.txt");
    }

    #[test]
    fn cp437_passes_ascii() {
        assert_eq!(decode_cp437(b"hello.txt"), "hello.txt");
        assert_eq!(decode_cp437(&[0x90]), "\u{FFFD}");
    }
}
