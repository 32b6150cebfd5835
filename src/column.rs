//! Spreadsheet column addressing.
//!
//! Columns are named A..Z, AA..ZZ, AAA.. and so on. Index 0 is `A`, 25 is
//! `Z`, 26 is `AA`; the last column of an XLSX sheet is `XFD` (16383).

/// Number of columns addressable in an XLSX worksheet.
pub const MAX_COLUMNS: usize = 16_384;

/// Decode column letters into a zero-based column index.
///
/// Letters are case-insensitive. Empty or invalid input (and input that
/// would overflow `usize`) decodes to 0.
///
/// # Example
///
/// ```
/// use sheetbind::column::column_index;
///
/// assert_eq!(column_index("A"), 0);
/// assert_eq!(column_index("AA"), 26);
/// assert_eq!(column_index("XFD"), 16383);
/// assert_eq!(column_index("A1"), 0);
/// ```
pub fn column_index(letters: &str) -> usize {
    decode_letters(letters).unwrap_or(0)
}

fn decode_letters(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }

    let mut acc: usize = 0;
    for b in letters.bytes() {
        if !b.is_ascii_alphabetic() {
            return None;
        }
        let digit = (b.to_ascii_uppercase() - b'A') as usize + 1;
        acc = acc.checked_mul(26)?.checked_add(digit)?;
    }

    Some(acc - 1)
}

/// Encode a zero-based column index as column letters.
///
/// # Example
///
/// ```
/// use sheetbind::column::column_letters;
///
/// assert_eq!(column_letters(0), "A");
/// assert_eq!(column_letters(701), "ZZ");
/// ```
pub fn column_letters(index: usize) -> String {
    let mut buf = Vec::with_capacity(4);
    let mut n = index as u128 + 1;

    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        buf.push(b'A' + rem);
        n = (n - 1) / 26;
    }

    buf.reverse();
    buf.into_iter().map(char::from).collect()
}

/// Split an A1-style cell reference into zero-based `(column, row)`.
///
/// Returns `None` when the letters or the row number are missing, when the
/// row is 0, or when anything follows the digits.
pub fn split_cell_reference(reference: &str) -> Option<(usize, usize)> {
    let split = reference
        .bytes()
        .position(|b| !b.is_ascii_alphabetic())
        .unwrap_or(reference.len());
    let (letters, digits) = reference.split_at(split);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let column = decode_letters(letters)?;
    let row: usize = digits.parse().ok()?;
    if row == 0 {
        return None;
    }

    Some((column, row - 1))
}

/// Build an A1-style reference from a zero-based row and column.
pub fn cell_reference(row: usize, column: usize) -> String {
    format!("{}{}", column_letters(column), row + 1)
}
