use aws_sdk_sns::types::MessageAttributeValue;

use super::messaging::{DeliveryError, SmsSender, TopicPublisher};
use super::run_blocking;

const SMS_TYPE_ATTRIBUTE: &str = "AWS.SNS.SMS.SMSType";

pub struct SnsSms {
    client: aws_sdk_sns::Client,
}

impl SnsSms {
    pub fn new(client: aws_sdk_sns::Client) -> Self {
        Self { client }
    }
}

impl SmsSender for SnsSms {
    fn send_sms(&self, phone: &str, message: &str) -> Result<String, DeliveryError> {
        let sms_type = MessageAttributeValue::builder()
            .data_type("String")
            .string_value("Transactional")
            .build()
            .map_err(|error| DeliveryError::Sms(error.to_string()))?;
        let request = self
            .client
            .publish()
            .phone_number(phone)
            .message(message)
            .message_attributes(SMS_TYPE_ATTRIBUTE, sms_type);

        let output = run_blocking(async move { request.send().await })
            .map_err(|error| DeliveryError::Sms(error.to_string()))?;
        Ok(output.message_id().unwrap_or_default().to_string())
    }
}

pub struct SnsTopicPublisher {
    topic_arn: String,
    client: aws_sdk_sns::Client,
}

impl SnsTopicPublisher {
    pub fn new(topic_arn: impl Into<String>, client: aws_sdk_sns::Client) -> Self {
        Self {
            topic_arn: topic_arn.into(),
            client,
        }
    }
}

impl TopicPublisher for SnsTopicPublisher {
    fn publish(&self, subject: &str, message: &str) -> Result<(), DeliveryError> {
        let request = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(subject)
            .message(message);

        run_blocking(async move { request.send().await })
            .map(|_| ())
            .map_err(|error| DeliveryError::Topic(error.to_string()))
    }
}
