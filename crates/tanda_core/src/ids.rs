use rand::distributions::{Alphanumeric, DistString, Slice};
use rand::Rng;
use uuid::Uuid;

const SHORT_ID_ALPHABET: [char; 36] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r',
    's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

pub const TANDA_ID_LEN: usize = 9;
pub const RESET_TOKEN_LEN: usize = 64;

/// Random `[a-z0-9]` string.
pub fn short_id(len: usize) -> String {
    let Ok(alphabet) = Slice::new(&SHORT_ID_ALPHABET) else {
        return String::new();
    };
    rand::thread_rng()
        .sample_iter(alphabet)
        .take(len)
        .collect()
}

pub fn tanda_id() -> String {
    short_id(TANDA_ID_LEN)
}

pub fn participant_id() -> String {
    format!("part_{}", short_id(8))
}

/// Participants created through a public registration link.
pub fn linked_participant_id() -> String {
    format!("part_{}", uuid_hex(12))
}

pub fn notification_id() -> String {
    format!("notif_{}", short_id(8))
}

pub fn user_id() -> String {
    format!("user_{}", uuid_hex(8))
}

pub fn registration_token() -> String {
    Uuid::new_v4().to_string()
}

pub fn reset_token() -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), RESET_TOKEN_LEN)
}

fn uuid_hex(len: usize) -> String {
    let mut hex = Uuid::new_v4().simple().to_string();
    hex.truncate(len);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_short_id_char(c: char) -> bool {
        c.is_ascii_lowercase() || c.is_ascii_digit()
    }

    #[test]
    fn tanda_ids_are_nine_lowercase_alphanumerics() {
        let id = tanda_id();
        assert_eq!(id.len(), 9);
        assert!(id.chars().all(is_short_id_char));
    }

    #[test]
    fn prefixed_ids_have_expected_shapes() {
        let participant = participant_id();
        assert!(participant.starts_with("part_"));
        assert_eq!(participant.len(), 13);

        let linked = linked_participant_id();
        assert_eq!(linked.len(), 17);
        assert!(linked[5..].chars().all(|c| c.is_ascii_hexdigit()));

        let user = user_id();
        assert_eq!(user.len(), 13);
        assert!(user.starts_with("user_"));

        assert!(notification_id().starts_with("notif_"));
    }

    #[test]
    fn tokens_are_unique_and_well_formed() {
        let token = registration_token();
        assert!(Uuid::parse_str(&token).is_ok());
        assert_ne!(token, registration_token());

        let reset = reset_token();
        assert_eq!(reset.len(), RESET_TOKEN_LEN);
        assert!(reset.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
