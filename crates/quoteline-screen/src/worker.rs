//! Single-identifier fetch: admission, request, classification, projection.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use quoteline_core::{
    AdmissionGate, FetchError, RetryPolicy, Transport, retry_with_backoff, should_stop,
};
use serde_json::Value;

use crate::config::{FieldMapping, RequestTemplate};
use crate::decode;
use crate::record::NormalizedRecord;

/// Everything a worker needs for one batch, borrowed from the runner.
pub(crate) struct FetchContext<'a> {
    pub transport: &'a dyn Transport,
    pub template: &'a RequestTemplate,
    pub mapping: &'a FieldMapping,
    pub columns: Arc<[String]>,
    pub retry: RetryPolicy,
    pub gate: &'a AdmissionGate,
    pub stop: &'a AtomicBool,
}

#[derive(Debug)]
pub(crate) enum Outcome {
    Fetched(NormalizedRecord),
    Failed(FetchError),
    /// Stop was raised before the request went out
    Skipped,
}

#[derive(Debug)]
pub(crate) struct FetchOutcome {
    pub outcome: Outcome,
    pub retries: u32,
}

/// Fetch and normalize one identifier.
///
/// Holds one admission slot for the whole exchange, retries included. The
/// slot is released when the guard drops, on every path.
pub(crate) fn fetch_one(ctx: &FetchContext<'_>, identifier: &str) -> FetchOutcome {
    let _slot = ctx.gate.acquire();
    if should_stop(ctx.stop) {
        return FetchOutcome {
            outcome: Outcome::Skipped,
            retries: 0,
        };
    }

    let attempted = retry_with_backoff(identifier, &ctx.retry, ctx.stop, || {
        request_once(ctx.transport, ctx.template, identifier)
    });

    let outcome = match attempted
        .result
        .and_then(|raw| decode::project(&raw, ctx.mapping, &ctx.columns, identifier))
    {
        Ok(record) => Outcome::Fetched(record),
        Err(e) => Outcome::Failed(e),
    };
    FetchOutcome {
        outcome,
        retries: attempted.backoffs,
    }
}

/// One GET plus status classification. Only transport faults are retryable.
fn request_once(
    transport: &dyn Transport,
    template: &RequestTemplate,
    identifier: &str,
) -> Result<Vec<Value>, FetchError> {
    let url = template.url_for(identifier);
    let response = transport.get(&url, &template.headers)?;
    if response.status != 200 {
        return Err(FetchError::from_status(response.status));
    }
    if response.body.contains(template.firewall_marker.as_str()) {
        return Err(FetchError::Blocked {
            status: response.status,
        });
    }
    decode::extract_quote(&response.body, identifier)
}
