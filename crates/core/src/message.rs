//! Outbound queue message produced for a record that is being retried.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::RunId;

/// Trace propagation attribute carrying the span id.
pub const ATTR_SPAN_ID: &str = "x-B3-SpanId";
/// Trace propagation attribute carrying the trace id (the IDoc number).
pub const ATTR_TRACE_ID: &str = "x-B3-TraceId";
/// Attribute naming the publishing service.
pub const ATTR_SERVICE_MONIKER: &str = "x-client-service-moniker";

/// A message ready to be handed to a queue client.
///
/// `dedup_key` and `group_key` map to the queue's de-duplication and ordered
/// delivery features when the backend has them; otherwise they are carried as
/// plain metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub body: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_key: Option<String>,
}

impl OutboundMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            attributes: BTreeMap::new(),
            dedup_key: None,
            group_key: None,
        }
    }

    /// Serialize `payload` as the JSON body.
    pub fn json<T: Serialize>(payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_string(payload)?))
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    pub fn with_group_key(mut self, key: impl Into<String>) -> Self {
        self.group_key = Some(key.into());
        self
    }

    /// Standard trace attributes shared by both domains.
    ///
    /// The record's own correlation id is preferred for the span id; the run id
    /// stands in when the record has none.
    pub fn with_trace_attributes(
        self,
        ctx: &MessageContext<'_>,
        correlation_id: Option<&str>,
        idoc_number: Option<&str>,
    ) -> Self {
        let span_id = correlation_id
            .map(str::to_string)
            .unwrap_or_else(|| ctx.run_id.to_string());

        let msg = self
            .with_attribute(ATTR_SPAN_ID, span_id)
            .with_attribute(ATTR_SERVICE_MONIKER, ctx.service_moniker);

        match idoc_number {
            Some(idoc) => msg.with_attribute(ATTR_TRACE_ID, idoc),
            None => msg,
        }
    }
}

/// Per-call context needed to build outbound messages.
#[derive(Debug, Clone, Copy)]
pub struct MessageContext<'a> {
    pub run_id: RunId,
    pub service_moniker: &'a str,
}
