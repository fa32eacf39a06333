use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};

use super::messaging::{DeliveryError, EmailMessage, EmailSender};
use super::run_blocking;

pub struct SesMailer {
    client: aws_sdk_sesv2::Client,
}

impl SesMailer {
    pub fn new(client: aws_sdk_sesv2::Client) -> Self {
        Self { client }
    }
}

fn utf8_content(text: &str) -> Result<Content, DeliveryError> {
    Content::builder()
        .data(text)
        .charset("UTF-8")
        .build()
        .map_err(|error| DeliveryError::Email(error.to_string()))
}

impl EmailSender for SesMailer {
    fn send_email(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        let body = Body::builder()
            .html(utf8_content(&message.html)?)
            .text(utf8_content(&message.text)?)
            .build();
        let content = EmailContent::builder()
            .simple(
                Message::builder()
                    .subject(utf8_content(&message.subject)?)
                    .body(body)
                    .build(),
            )
            .build();
        let request = self
            .client
            .send_email()
            .from_email_address(&message.from)
            .destination(Destination::builder().to_addresses(&message.to).build())
            .content(content);

        run_blocking(async move { request.send().await })
            .map(|_| ())
            .map_err(|error| DeliveryError::Email(error.to_string()))
    }
}
