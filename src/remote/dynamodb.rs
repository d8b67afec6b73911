use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    Client,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::RequestId,
    types::{AttributeValue, ReturnValue},
};

use super::{Page, RemoteError, RemoteTableService, send_remote_request};
use crate::table::{Fields, Patch, Row, Scalar, SortSpec};

pub const ID_ATTRIBUTE: &str = "id";

type Item = HashMap<String, AttributeValue>;

/// A table stored in DynamoDB under a numeric `id` partition key.
///
/// DynamoDB has no server-side ordering or exact counts over a scan, so a
/// page fetch scans the whole table and orders it locally. That is fine for
/// reference data (brands, models) and keeps the count exact.
#[derive(Clone)]
pub struct DynamoTableService {
    client: Client,
    table_name: String,
    default_sort: SortSpec,
}

impl DynamoTableService {
    pub fn new(client: Client, table_name: &str, default_sort: SortSpec) -> Self {
        Self {
            client,
            table_name: table_name.to_string(),
            default_sort,
        }
    }

    async fn scan_all(&self, projection: Option<&str>) -> Result<Vec<Item>, RemoteError> {
        let mut items = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let mut request = self
                .client
                .scan()
                .table_name(&self.table_name)
                .set_exclusive_start_key(start_key.take());
            if let Some(attr) = projection {
                request = request
                    .projection_expression("#p")
                    .expression_attribute_names("#p", attr);
            }
            let span = tracing::trace_span!(
                "Scan",
                table = %self.table_name,
                scanned_so_far = items.len()
            );
            let output = send_remote_request(span, || request.send())
                .await
                .map_err(|err| RemoteError::Transport(format_sdk_error(&err)))?;
            items.extend(output.items().iter().cloned());
            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(items)
    }

    async fn get(&self, id: i64) -> Result<Row, RemoteError> {
        let span = tracing::trace_span!("GetItem", table = %self.table_name, id);
        let output = send_remote_request(span, || {
            self.client
                .get_item()
                .table_name(&self.table_name)
                .key(ID_ATTRIBUTE, id_value(id))
                .consistent_read(true)
                .send()
        })
        .await
        .map_err(|err| RemoteError::Transport(format_sdk_error(&err)))?;
        let item = output.item().ok_or(RemoteError::NotFound(id))?;
        row_from_item(item)
    }
}

#[async_trait]
impl RemoteTableService for DynamoTableService {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn fetch_page(
        &self,
        range_start: usize,
        range_end: usize,
        sort: Option<&SortSpec>,
    ) -> Result<Page, RemoteError> {
        let items = self.scan_all(None).await?;
        let rows = items
            .iter()
            .map(row_from_item)
            .collect::<Result<Vec<_>, _>>()?;
        let page = Page::slice(rows, range_start, range_end, sort.unwrap_or(&self.default_sort));
        tracing::debug!(
            table = %self.table_name,
            range_start,
            range_end,
            rows = page.rows.len(),
            total = page.total_count,
            "fetch_page"
        );
        Ok(page)
    }

    async fn fetch_max_identifier(&self) -> Result<Option<i64>, RemoteError> {
        let items = self.scan_all(Some(ID_ATTRIBUTE)).await?;
        let mut max = None;
        for item in &items {
            let id = item_id(item)?;
            max = Some(max.map_or(id, |current: i64| current.max(id)));
        }
        Ok(max)
    }

    async fn insert(&self, row: Row) -> Result<Row, RemoteError> {
        let item = item_from_row(&row);
        let span = tracing::trace_span!("PutItem", table = %self.table_name, id = row.id);
        let result = send_remote_request(span, || {
            self.client
                .put_item()
                .table_name(&self.table_name)
                .set_item(Some(item))
                .condition_expression("attribute_not_exists(#id)")
                .expression_attribute_names("#id", ID_ATTRIBUTE)
                .send()
        })
        .await;
        match result {
            Ok(_) => Ok(row),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Err(RemoteError::Conflict(format!("id {} already exists", row.id)))
            }
            Err(err) => Err(RemoteError::Transport(format_sdk_error(&err))),
        }
    }

    async fn update(&self, id: i64, patch: Patch) -> Result<Row, RemoteError> {
        if patch.is_empty() {
            return self.get(id).await;
        }
        let expr = UpdateExpression::from_patch(&patch);
        let span = tracing::trace_span!(
            "UpdateItem",
            table = %self.table_name,
            id,
            fields = patch.len()
        );
        let result = send_remote_request(span, || {
            self.client
                .update_item()
                .table_name(&self.table_name)
                .key(ID_ATTRIBUTE, id_value(id))
                .update_expression(expr.expression.clone())
                .condition_expression("attribute_exists(#id)")
                .set_expression_attribute_names(Some(expr.names.clone()))
                .set_expression_attribute_values(if expr.values.is_empty() {
                    None
                } else {
                    Some(expr.values.clone())
                })
                .return_values(ReturnValue::AllNew)
                .send()
        })
        .await;
        match result {
            Ok(output) => match output.attributes() {
                Some(item) => row_from_item(item),
                None => self.get(id).await,
            },
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Err(RemoteError::NotFound(id))
            }
            Err(err) => Err(RemoteError::Transport(format_sdk_error(&err))),
        }
    }

    async fn delete(&self, id: i64) -> Result<(), RemoteError> {
        let span = tracing::trace_span!("DeleteItem", table = %self.table_name, id);
        send_remote_request(span, || {
            self.client
                .delete_item()
                .table_name(&self.table_name)
                .key(ID_ATTRIBUTE, id_value(id))
                .send()
        })
        .await
        .map(|_| ())
        .map_err(|err| RemoteError::Transport(format_sdk_error(&err)))
    }
}

struct UpdateExpression {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl UpdateExpression {
    fn from_patch(patch: &Patch) -> Self {
        let mut names = HashMap::new();
        let mut values = HashMap::new();
        let mut set = Vec::new();
        let mut remove = Vec::new();
        names.insert("#id".to_string(), ID_ATTRIBUTE.to_string());
        for (idx, (name, value)) in patch.fields().iter().enumerate() {
            let name_ref = format!("#f{idx}");
            names.insert(name_ref.clone(), name.clone());
            if value.is_null() {
                remove.push(name_ref);
            } else {
                let value_ref = format!(":v{idx}");
                set.push(format!("{name_ref} = {value_ref}"));
                values.insert(value_ref, attribute_from_scalar(value));
            }
        }
        let mut clauses = Vec::new();
        if !set.is_empty() {
            clauses.push(format!("SET {}", set.join(", ")));
        }
        if !remove.is_empty() {
            clauses.push(format!("REMOVE {}", remove.join(", ")));
        }
        Self {
            expression: clauses.join(" "),
            names,
            values,
        }
    }
}

fn id_value(id: i64) -> AttributeValue {
    AttributeValue::N(id.to_string())
}

fn item_id(item: &Item) -> Result<i64, RemoteError> {
    item.get(ID_ATTRIBUTE)
        .and_then(|value| value.as_n().ok())
        .and_then(|raw| raw.parse::<i64>().ok())
        .ok_or_else(|| RemoteError::Transport("item is missing a numeric id".to_string()))
}

pub fn row_from_item(item: &Item) -> Result<Row, RemoteError> {
    let id = item_id(item)?;
    let mut fields = Fields::new();
    for (name, value) in item {
        if name == ID_ATTRIBUTE {
            continue;
        }
        match scalar_from_attribute(value) {
            Some(scalar) => {
                fields.insert(name.clone(), scalar);
            }
            None => tracing::trace!(id, attribute = %name, "Skipping non-scalar attribute"),
        }
    }
    Ok(Row { id, fields })
}

pub fn item_from_row(row: &Row) -> Item {
    let mut item = Item::with_capacity(row.fields.len() + 1);
    item.insert(ID_ATTRIBUTE.to_string(), id_value(row.id));
    for (name, value) in &row.fields {
        if !value.is_null() {
            item.insert(name.clone(), attribute_from_scalar(value));
        }
    }
    item
}

fn scalar_from_attribute(value: &AttributeValue) -> Option<Scalar> {
    match value {
        AttributeValue::S(text) => Some(Scalar::Text(text.clone())),
        AttributeValue::N(num) => Some(
            num.parse::<i64>()
                .map(Scalar::Int)
                .unwrap_or_else(|_| Scalar::Text(num.clone())),
        ),
        AttributeValue::Bool(value) => Some(Scalar::Bool(*value)),
        AttributeValue::Null(_) => Some(Scalar::Null),
        _ => None,
    }
}

fn attribute_from_scalar(value: &Scalar) -> AttributeValue {
    match value {
        Scalar::Null => AttributeValue::Null(true),
        Scalar::Bool(value) => AttributeValue::Bool(*value),
        Scalar::Int(value) => AttributeValue::N(value.to_string()),
        Scalar::Text(text) => AttributeValue::S(text.clone()),
    }
}

fn format_sdk_error<E>(err: &SdkError<E>) -> String
where
    E: ProvideErrorMetadata + RequestId + std::error::Error + 'static,
{
    if let Some(service_err) = err.as_service_error() {
        let code = service_err.code().unwrap_or("ServiceError");
        let message = service_err.message().unwrap_or("").trim();
        let mut summary = if message.is_empty() {
            code.to_string()
        } else {
            format!("{code}: {message}")
        };
        if let Some(request_id) = service_err.request_id() {
            summary.push_str(&format!(" (request id: {request_id})"));
        }
        return summary;
    }
    DisplayErrorContext(err).to_string()
}
