//! The fixed three-column row record: `(id, username, email)`.

use crate::err;
use crate::errors::Error;

pub const ID_SIZE: usize = 4;
pub const USERNAME_SIZE: usize = 32;
pub const EMAIL_SIZE: usize = 255;
pub const ID_OFFSET: usize = 0;
pub const USERNAME_OFFSET: usize = ID_OFFSET + ID_SIZE;
pub const EMAIL_OFFSET: usize = USERNAME_OFFSET + USERNAME_SIZE;
pub const ROW_SIZE: usize = ID_SIZE + USERNAME_SIZE + EMAIL_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u32,
    pub username: String,
    pub email: String,
}

impl Row {
    pub fn new(id: u32, username: &str, email: &str) -> Result<Self, Error> {
        if username.len() >= USERNAME_SIZE {
            return Err(err!(
                Syntax,
                "username '{}' exceeds {} bytes",
                username,
                USERNAME_SIZE - 1
            ));
        }
        if email.len() >= EMAIL_SIZE {
            return Err(err!(
                Syntax,
                "email '{}' exceeds {} bytes",
                email,
                EMAIL_SIZE - 1
            ));
        }
        Ok(Row {
            id,
            username: username.to_string(),
            email: email.to_string(),
        })
    }
}

/// Writes `id` as 4 little-endian bytes, then `username`/`email` as
/// fixed-length NUL-padded byte strings, into `dst` (which must be at least
/// `ROW_SIZE` bytes).
pub fn serialize_row(row: &Row, dst: &mut [u8]) {
    dst[ID_OFFSET..ID_OFFSET + ID_SIZE].copy_from_slice(&row.id.to_le_bytes());
    write_padded(&mut dst[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE], &row.username);
    write_padded(&mut dst[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE], &row.email);
}

pub fn deserialize_row(src: &[u8]) -> Row {
    let id = u32::from_le_bytes([
        src[ID_OFFSET],
        src[ID_OFFSET + 1],
        src[ID_OFFSET + 2],
        src[ID_OFFSET + 3],
    ]);
    let username = read_padded(&src[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE]);
    let email = read_padded(&src[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE]);
    Row { id, username, email }
}

/// A column value pulled out of a [`Row`] by name, comparable within its own
/// variant. `user_id` is accepted as a synonym for `id` since the fixed row
/// has only one integer column for a second table's foreign key to name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum RowValue {
    Int(u32),
    Str(String),
}

impl RowValue {
    pub fn to_display_string(&self) -> String {
        match self {
            RowValue::Int(n) => n.to_string(),
            RowValue::Str(s) => s.clone(),
        }
    }
}

pub fn column_value(row: &Row, column: &str) -> Result<RowValue, Error> {
    match column {
        "id" | "user_id" => Ok(RowValue::Int(row.id)),
        "username" => Ok(RowValue::Str(row.username.clone())),
        "email" => Ok(RowValue::Str(row.email.clone())),
        other => Err(err!(NotFound, "no such column '{}'", other)),
    }
}

fn write_padded(dst: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    dst.fill(0);
    dst[..bytes.len()].copy_from_slice(bytes);
}

fn read_padded(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let row = Row::new(7, "alice", "alice@example.com").unwrap();
        let mut buf = [0u8; ROW_SIZE];
        serialize_row(&row, &mut buf);
        assert_eq!(deserialize_row(&buf), row);
    }

    #[test]
    fn round_trip_empty_strings() {
        let row = Row::new(0, "", "").unwrap();
        let mut buf = [0u8; ROW_SIZE];
        serialize_row(&row, &mut buf);
        assert_eq!(deserialize_row(&buf), row);
    }

    #[test]
    fn oversize_username_rejected() {
        let long = "a".repeat(USERNAME_SIZE);
        assert!(Row::new(1, &long, "e").is_err());
    }
}
