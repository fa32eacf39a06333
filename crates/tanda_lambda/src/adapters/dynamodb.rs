use std::collections::HashMap;

use aws_sdk_dynamodb::types::{AttributeValue, PutRequest, ReturnValue, WriteRequest};
use serde_json::Value;
use tanda_core::numbers::{decimal_string, parse_decimal};

use super::kv_store::{Item, KeyValueStore, Query, ScanPage, StoreError};
use super::run_blocking;

pub struct DynamoDbStore {
    client: aws_sdk_dynamodb::Client,
}

impl DynamoDbStore {
    pub fn new(client: aws_sdk_dynamodb::Client) -> Self {
        Self { client }
    }
}

pub fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(flag) => AttributeValue::Bool(*flag),
        Value::Number(number) => AttributeValue::N(decimal_string(number)),
        Value::String(text) => AttributeValue::S(text.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(to_attribute_map(map)),
    }
}

pub fn to_attribute_map(item: &Item) -> HashMap<String, AttributeValue> {
    item.iter()
        .map(|(name, value)| (name.clone(), to_attribute(value)))
        .collect()
}

pub fn from_attribute(attribute: &AttributeValue) -> Result<Value, StoreError> {
    let number = |text: &String| {
        parse_decimal(text).ok_or_else(|| StoreError::Conversion(format!("invalid number {text}")))
    };
    Ok(match attribute {
        AttributeValue::S(text) => Value::String(text.clone()),
        AttributeValue::N(text) => number(text)?,
        AttributeValue::Bool(flag) => Value::Bool(*flag),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(items) => Value::Array(
            items
                .iter()
                .map(from_attribute)
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::M(map) => Value::Object(from_attribute_map(map)?),
        AttributeValue::Ss(values) => {
            Value::Array(values.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(values) => {
            Value::Array(values.iter().map(number).collect::<Result<_, _>>()?)
        }
        other => {
            return Err(StoreError::Conversion(format!(
                "attribute type not supported: {other:?}"
            )))
        }
    })
}

pub fn from_attribute_map(map: &HashMap<String, AttributeValue>) -> Result<Item, StoreError> {
    map.iter()
        .map(|(name, value)| Ok((name.clone(), from_attribute(value)?)))
        .collect()
}

/// `SET #a0 = :v0, #a1 = :v1, ...` with name and value placeholders.
fn update_expression(
    changes: &Item,
) -> (
    String,
    HashMap<String, String>,
    HashMap<String, AttributeValue>,
) {
    let mut clauses = Vec::with_capacity(changes.len());
    let mut names = HashMap::with_capacity(changes.len());
    let mut values = HashMap::with_capacity(changes.len());
    for (index, (name, value)) in changes.iter().enumerate() {
        clauses.push(format!("#a{index} = :v{index}"));
        names.insert(format!("#a{index}"), name.clone());
        values.insert(format!(":v{index}"), to_attribute(value));
    }
    (format!("SET {}", clauses.join(", ")), names, values)
}

impl KeyValueStore for DynamoDbStore {
    fn get_item(&self, table: &str, key: &Item) -> Result<Option<Item>, StoreError> {
        let client = self.client.clone();
        let request_key = to_attribute_map(key);
        let output = run_blocking(async move {
            client
                .get_item()
                .table_name(table)
                .set_key(Some(request_key))
                .send()
                .await
        })
        .map_err(|error| StoreError::backend(table, "get_item", error))?;
        output.item().map(from_attribute_map).transpose()
    }

    fn put_item(&self, table: &str, item: &Item) -> Result<(), StoreError> {
        let client = self.client.clone();
        let request_item = to_attribute_map(item);
        run_blocking(async move {
            client
                .put_item()
                .table_name(table)
                .set_item(Some(request_item))
                .send()
                .await
        })
        .map(|_| ())
        .map_err(|error| StoreError::backend(table, "put_item", error))
    }

    fn update_item(&self, table: &str, key: &Item, changes: &Item) -> Result<Item, StoreError> {
        if changes.is_empty() {
            return self.get_item(table, key).map(Option::unwrap_or_default);
        }
        let client = self.client.clone();
        let request_key = to_attribute_map(key);
        let (expression, names, values) = update_expression(changes);
        let output = run_blocking(async move {
            client
                .update_item()
                .table_name(table)
                .set_key(Some(request_key))
                .update_expression(expression)
                .set_expression_attribute_names(Some(names))
                .set_expression_attribute_values(Some(values))
                .return_values(ReturnValue::AllNew)
                .send()
                .await
        })
        .map_err(|error| StoreError::backend(table, "update_item", error))?;
        output
            .attributes()
            .map(from_attribute_map)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    fn delete_item(&self, table: &str, key: &Item) -> Result<(), StoreError> {
        let client = self.client.clone();
        let request_key = to_attribute_map(key);
        run_blocking(async move {
            client
                .delete_item()
                .table_name(table)
                .set_key(Some(request_key))
                .send()
                .await
        })
        .map(|_| ())
        .map_err(|error| StoreError::backend(table, "delete_item", error))
    }

    fn query(&self, table: &str, query: &Query) -> Result<Vec<Item>, StoreError> {
        let mut condition = "#pk = :pk".to_string();
        let mut names = HashMap::from([("#pk".to_string(), query.key_name.clone())]);
        let mut values = HashMap::from([(":pk".to_string(), to_attribute(&query.key_value))]);
        if let Some((sort_key, prefix)) = &query.sort_prefix {
            condition.push_str(" AND begins_with(#sk, :sk)");
            names.insert("#sk".to_string(), sort_key.clone());
            values.insert(":sk".to_string(), AttributeValue::S(prefix.clone()));
        }

        let mut items = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let client = self.client.clone();
            let request = client
                .query()
                .table_name(table)
                .set_index_name(query.index.clone())
                .key_condition_expression(condition.clone())
                .set_expression_attribute_names(Some(names.clone()))
                .set_expression_attribute_values(Some(values.clone()))
                .set_exclusive_start_key(start_key.take());
            let output = run_blocking(async move { request.send().await })
                .map_err(|error| StoreError::backend(table, "query", error))?;
            for raw in output.items() {
                items.push(from_attribute_map(raw)?);
            }
            match output.last_evaluated_key() {
                Some(next) if !next.is_empty() => start_key = Some(next.clone()),
                _ => return Ok(items),
            }
        }
    }

    fn scan_page(
        &self,
        table: &str,
        projection: Option<&[String]>,
        start_key: Option<&Item>,
    ) -> Result<ScanPage, StoreError> {
        let mut request = self
            .client
            .scan()
            .table_name(table)
            .set_exclusive_start_key(start_key.map(to_attribute_map));
        if let Some(attributes) = projection {
            let placeholders: Vec<String> =
                (0..attributes.len()).map(|index| format!("#p{index}")).collect();
            let names: HashMap<String, String> = placeholders
                .iter()
                .cloned()
                .zip(attributes.iter().cloned())
                .collect();
            request = request
                .projection_expression(placeholders.join(","))
                .set_expression_attribute_names(Some(names));
        }
        let output = run_blocking(async move { request.send().await })
            .map_err(|error| StoreError::backend(table, "scan", error))?;

        let items = output
            .items()
            .iter()
            .map(from_attribute_map)
            .collect::<Result<Vec<_>, _>>()?;
        let last_evaluated_key = match output.last_evaluated_key() {
            Some(next) if !next.is_empty() => Some(from_attribute_map(next)?),
            _ => None,
        };
        Ok(ScanPage {
            items,
            last_evaluated_key,
        })
    }

    fn batch_put(&self, table: &str, items: &[Item]) -> Result<Vec<Item>, StoreError> {
        let mut requests = Vec::with_capacity(items.len());
        for item in items {
            let put = PutRequest::builder()
                .set_item(Some(to_attribute_map(item)))
                .build()
                .map_err(|error| StoreError::backend(table, "batch_write_item", error))?;
            requests.push(WriteRequest::builder().put_request(put).build());
        }

        let client = self.client.clone();
        let output = run_blocking(async move {
            client
                .batch_write_item()
                .request_items(table, requests)
                .send()
                .await
        })
        .map_err(|error| StoreError::backend(table, "batch_write_item", error))?;

        let mut unprocessed = Vec::new();
        if let Some(pending) = output.unprocessed_items().and_then(|map| map.get(table)) {
            for request in pending {
                if let Some(put) = request.put_request() {
                    unprocessed.push(from_attribute_map(put.item())?);
                }
            }
        }
        Ok(unprocessed)
    }

    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let client = self.client.clone();
        let result = run_blocking(async move { client.describe_table().table_name(table).send().await });
        match result {
            Ok(_) => Ok(true),
            Err(error)
                if error
                    .as_service_error()
                    .map(|service| service.is_resource_not_found_exception())
                    .unwrap_or(false) =>
            {
                Ok(false)
            }
            Err(error) => Err(StoreError::backend(table, "describe_table", error)),
        }
    }
}
