//! Submission, response handling and the per-block sweeps of the query layer.

use liquid_stake_db::KvStore;
use tracing::{debug, info, warn};

use crate::{
    errors::{QueryError, QueryResult},
    host::QueryHost,
    row_spec::{DataPointRowSpec, QueryRowSpec},
    types::{DataPoint, ProofOps, Query, QueryRequest, ResponseOutcome, TimeoutPolicy},
};

/// Counter mixed into the salt of unique query ids.
const QUERY_SALT_COUNTER: &str = "query_salt";

/// Reads a pending query.
pub fn get_query(store: &KvStore, id: &str) -> QueryResult<Option<Query>> {
    Ok(store.get_row::<QueryRowSpec>(&id.to_string())?)
}

/// Returns every pending query in id order.
pub fn all_queries(store: &KvStore) -> QueryResult<Vec<Query>> {
    Ok(store
        .collect_rows::<QueryRowSpec>(&[])?
        .into_iter()
        .map(|(_, query)| query)
        .collect())
}

/// Reads the latest verified response for a query id.
pub fn get_data_point(store: &KvStore, id: &str) -> QueryResult<Option<DataPoint>> {
    Ok(store.get_row::<DataPointRowSpec>(&id.to_string())?)
}

/// Returns `true` if a query with the same identity as `query` is pending, including retries
/// submitted under a salted id.
pub fn is_in_flight(store: &KvStore, query: &Query) -> QueryResult<bool> {
    if store.has_row::<QueryRowSpec>(&query.derive_id(None))? {
        return Ok(true);
    }

    Ok(all_queries(store)?
        .iter()
        .any(|pending| pending.same_identity(query)))
}

/// Registers `query` and returns its id.
///
/// An already pending query with the same id only has its TTL and request flag refreshed. When
/// `force_unique` is set, the block time and a counter are mixed into the id so the query never
/// collides with an earlier one.
pub fn submit_query<H: QueryHost>(
    host: &mut H,
    mut query: Query,
    force_unique: bool,
) -> Result<String, H::Error> {
    query.validate()?;

    if host
        .query_callback(&query.callback_module, &query.callback_id)
        .is_none()
    {
        return Err(QueryError::UnknownCallback {
            module: query.callback_module,
            callback_id: query.callback_id,
        }
        .into());
    }

    let block = host.block();
    let timeout_timestamp = block.time.saturating_add(query.timeout_duration);

    let id = if force_unique {
        let counter = host
            .store_mut()
            .next_sequence(QUERY_SALT_COUNTER)
            .map_err(QueryError::from)?;
        let mut salt = block.time.to_be_bytes().to_vec();
        salt.extend_from_slice(&counter.to_be_bytes());
        query.derive_id(Some(&salt))
    } else {
        query.derive_id(None)
    };

    if let Some(mut existing) = get_query(host.store(), &id)? {
        existing.timeout_timestamp = timeout_timestamp;
        existing.request_sent = false;
        host.store_mut()
            .put_row::<QueryRowSpec>(&id, &existing)
            .map_err(QueryError::from)?;

        debug!(%id, "refreshed pending query");
        return Ok(id);
    }

    let submission_height = host
        .light_client()
        .latest_height(&query.connection_id)
        .ok_or_else(|| {
            QueryError::Validation(format!(
                "no client state for connection {}",
                query.connection_id
            ))
        })?;

    query.id = id.clone();
    query.timeout_timestamp = timeout_timestamp;
    query.submission_height = submission_height;
    query.request_sent = false;

    host.store_mut()
        .put_row::<QueryRowSpec>(&id, &query)
        .map_err(QueryError::from)?;

    info!(
        %id,
        chain_id = %query.chain_id,
        query_type = %query.query_type,
        callback = %query.callback_id,
        %submission_height,
        "submitted query"
    );

    Ok(id)
}

/// Handles a relayed response.
///
/// Stale, unknown and unprovable responses are dropped without touching state so that a batch
/// carrying them still goes through. A callback error is returned to the caller, which is
/// expected to roll back the enclosing transaction.
pub fn on_response<H: QueryHost>(
    host: &mut H,
    id: &str,
    result: &[u8],
    proof: &ProofOps,
    height: u64,
) -> Result<ResponseOutcome, H::Error> {
    let Some(query) = get_query(host.store(), id)? else {
        debug!(%id, "ignoring response for unknown query");
        return Ok(ResponseOutcome::Missing);
    };

    if height < query.submission_height {
        warn!(
            %id,
            %height,
            submission_height = %query.submission_height,
            "ignoring stale query response"
        );
        return Ok(ResponseOutcome::Stale);
    }

    if query.timeout_timestamp < host.block().time {
        warn!(%id, "query response arrived after its timeout");
        handle_timeout(host, query)?;
        return Ok(ResponseOutcome::Expired);
    }

    if query.requires_proof() {
        if let Err(reason) = host.light_client().verify_membership(
            &query.connection_id,
            height,
            &query,
            result,
            proof,
        ) {
            warn!(%id, %reason, "query response proof rejected");
            return Ok(ResponseOutcome::ProofRejected);
        }
    }

    let callback = host
        .query_callback(&query.callback_module, &query.callback_id)
        .ok_or_else(|| QueryError::UnknownCallback {
            module: query.callback_module.clone(),
            callback_id: query.callback_id.clone(),
        })?;

    callback(host, result, &query)?;

    let local_height = host.block().height;
    let data_point = DataPoint {
        id: id.to_string(),
        remote_height: height,
        local_height,
        value: result.to_vec(),
    };
    host.store_mut()
        .put_row::<DataPointRowSpec>(&data_point.id, &data_point)
        .map_err(QueryError::from)?;

    // the callback may have touched the query, so work off the stored copy
    if let Some(mut query) = get_query(host.store(), id)? {
        if query.is_one_shot() {
            host.store_mut()
                .delete_row::<QueryRowSpec>(&id.to_string())
                .map_err(QueryError::from)?;
        } else {
            query.last_height = local_height;
            host.store_mut()
                .put_row::<QueryRowSpec>(&query.id, &query)
                .map_err(QueryError::from)?;
        }
    }

    info!(%id, callback = %query.callback_id, %height, "applied query response");
    Ok(ResponseOutcome::Applied)
}

/// Times out the query under `id`, applying its timeout policy.
pub fn on_timeout<H: QueryHost>(host: &mut H, id: &str) -> Result<(), H::Error> {
    match get_query(host.store(), id)? {
        Some(query) => handle_timeout(host, query),
        None => Ok(()),
    }
}

/// Deletes the query under `id` and submits it again under a fresh id.
pub fn retry_query<H: QueryHost>(host: &mut H, id: &str) -> Result<Option<String>, H::Error> {
    let Some(query) = get_query(host.store(), id)? else {
        return Ok(None);
    };

    delete_query(host.store_mut(), id)?;
    let new_id = submit_query(host, query, true)?;

    info!(old_id = %id, %new_id, "retried query");
    Ok(Some(new_id))
}

fn handle_timeout<H: QueryHost>(host: &mut H, query: Query) -> Result<(), H::Error> {
    match query.timeout_policy {
        TimeoutPolicy::RejectQueryResponse => {
            warn!(id = %query.id, callback = %query.callback_id, "query timed out, dropping");
            delete_query(host.store_mut(), &query.id)?;
        }
        TimeoutPolicy::RetryQueryRequest => {
            warn!(id = %query.id, callback = %query.callback_id, "query timed out, retrying");
            retry_query(host, &query.id)?;
        }
        TimeoutPolicy::ExecuteQueryCallback => {
            warn!(
                id = %query.id,
                callback = %query.callback_id,
                "query timed out, executing callback"
            );
            delete_query(host.store_mut(), &query.id)?;

            let callback = host
                .query_callback(&query.callback_module, &query.callback_id)
                .ok_or_else(|| QueryError::UnknownCallback {
                    module: query.callback_module.clone(),
                    callback_id: query.callback_id.clone(),
                })?;
            callback(host, &[], &query)?;
        }
    }

    Ok(())
}

fn delete_query(store: &mut KvStore, id: &str) -> QueryResult<()> {
    store.delete_row::<QueryRowSpec>(&id.to_string())?;
    Ok(())
}

/// Times out every query whose TTL has passed.
///
/// Each timeout runs in its own transaction so that one failing callback does not hold back the
/// others.
pub fn begin_block<H: QueryHost>(host: &mut H) -> Result<usize, H::Error> {
    let now = host.block().time;
    let expired: Vec<String> = all_queries(host.store())?
        .into_iter()
        .filter(|query| query.timeout_timestamp < now)
        .map(|query| query.id)
        .collect();

    for id in &expired {
        if let Err(err) = host.transact(|host| on_timeout(host, id)) {
            warn!(%id, %err, "failed to time out query");
        }
    }

    Ok(expired.len())
}

/// Emits a request event for every unsent query and every periodic query that is due.
pub fn end_block<H: QueryHost>(host: &mut H) -> Result<usize, H::Error> {
    let height = host.block().height;
    let mut emitted = 0;

    for mut query in all_queries(host.store())? {
        let due = query.period > 0
            && query.last_height.saturating_add(query.period.unsigned_abs()) == height;

        if query.request_sent && !due {
            continue;
        }

        query.request_sent = true;
        query.last_height = height;

        host.store_mut()
            .put_row::<QueryRowSpec>(&query.id, &query)
            .map_err(QueryError::from)?;
        host.emit_query_request(QueryRequest::from(&query));
        emitted += 1;
    }

    if emitted > 0 {
        debug!(%height, %emitted, "emitted query requests");
    }

    Ok(emitted)
}
