#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("sms delivery failed: {0}")]
    Sms(String),
    #[error("email delivery failed: {0}")]
    Email(String),
    #[error("topic publish failed: {0}")]
    Topic(String),
}

pub trait SmsSender {
    /// Sends to an E.164 number and returns the provider message id.
    fn send_sms(&self, phone: &str, message: &str) -> Result<String, DeliveryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

pub trait EmailSender {
    fn send_email(&self, message: &EmailMessage) -> Result<(), DeliveryError>;
}

pub trait TopicPublisher {
    fn publish(&self, subject: &str, message: &str) -> Result<(), DeliveryError>;
}

const DEFAULT_COUNTRY_CODE: &str = "52";

/// Keeps only digits, prefixes the Mexican country code when absent and
/// renders E.164.
pub fn to_e164(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.starts_with(DEFAULT_COUNTRY_CODE) {
        format!("+{digits}")
    } else {
        format!("+{DEFAULT_COUNTRY_CODE}{digits}")
    }
}
