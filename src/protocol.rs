//! Wire protocol text: prompts, notices, and line formats
//!
//! The relay speaks a line-oriented plain-text protocol. Every message the
//! server pushes to a client is a single `\n`-terminated line; the two
//! negotiation prompts are the only writes without a trailing newline.

use crate::error::{RelayError, Result};

/// Prompt for the display name, sent once after accept
pub const PSEUDO_PROMPT: &str = "Enter your pseudo: ";

/// Notice sent when the room choice is not a number
pub const NOTICE_NOT_A_NUMBER: &str = "Room must be a number.\n";

/// Build the room selection prompt for a relay with `room_count` rooms
pub fn room_prompt(room_count: usize) -> String {
    format!("Please choose a room (0-{}): ", room_count - 1)
}

/// Notice sent when the chosen room is out of range or full
pub fn notice_unavailable(room_count: usize) -> String {
    format!(
        "Please choose an available room in range 0-{}.\n",
        room_count - 1
    )
}

/// Notice sent when a client line exceeds the configured length limit
pub fn notice_too_long(max_line_len: usize) -> String {
    format!("Line too long (max {} bytes).\n", max_line_len)
}

/// Confirmation line sent once the session has joined a room
pub fn joined_line(room_id: usize) -> String {
    format!("You are in room {}\n", room_id)
}

/// Format one history entry for replay at join time
pub fn history_line(sender: &str, text: &str) -> String {
    format!("{}: {}\n", sender, text)
}

/// Format a message for relay to the other room members
pub fn relay_line(sender: &str, text: &str) -> String {
    format!("{}->{}\n", sender, text)
}

/// Parse a room choice line into a room id valid for `room_count` rooms.
///
/// Leading/trailing whitespace is ignored. A non-numeric line is a protocol
/// error; a numeric line outside `0..room_count` is a room-not-found error.
/// Both are recoverable: the session reports them and prompts again.
pub fn parse_room_choice(line: &str, room_count: usize) -> Result<usize> {
    let trimmed = line.trim();
    let room_id: usize = trimmed
        .parse()
        .map_err(|_| RelayError::protocol(format!("not a room number: {:?}", trimmed)))?;
    if room_id >= room_count {
        return Err(RelayError::room_not_found(format!(
            "room {} out of range 0-{}",
            room_id,
            room_count - 1
        )));
    }
    Ok(room_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts() {
        assert_eq!(PSEUDO_PROMPT, "Enter your pseudo: ");
        assert_eq!(room_prompt(4), "Please choose a room (0-3): ");
    }

    #[test]
    fn test_line_formats_are_newline_terminated() {
        assert_eq!(joined_line(2), "You are in room 2\n");
        assert_eq!(history_line("alice", "hi"), "alice: hi\n");
        assert_eq!(relay_line("alice", "hi"), "alice->hi\n");
    }

    #[test]
    fn test_notices() {
        assert_eq!(
            notice_unavailable(4),
            "Please choose an available room in range 0-3.\n"
        );
        assert_eq!(notice_too_long(16), "Line too long (max 16 bytes).\n");
    }

    #[test]
    fn test_parse_room_choice_valid() {
        assert_eq!(parse_room_choice("0", 4).unwrap(), 0);
        assert_eq!(parse_room_choice(" 3 ", 4).unwrap(), 3);
    }

    #[test]
    fn test_parse_room_choice_not_a_number() {
        assert!(matches!(
            parse_room_choice("lobby", 4),
            Err(RelayError::Protocol(_))
        ));
        assert!(matches!(
            parse_room_choice("", 4),
            Err(RelayError::Protocol(_))
        ));
        // negative numbers do not parse as usize
        assert!(matches!(
            parse_room_choice("-1", 4),
            Err(RelayError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_room_choice_out_of_range() {
        assert!(matches!(
            parse_room_choice("4", 4),
            Err(RelayError::RoomNotFound(_))
        ));
        assert!(matches!(
            parse_room_choice("100", 4),
            Err(RelayError::RoomNotFound(_))
        ));
    }
}
