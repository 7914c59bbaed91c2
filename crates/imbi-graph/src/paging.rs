//! Lazy, page-at-a-time row streams.

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, StreamExt};
use neo4rs::{query, BoltType, Row};

use crate::client::{GraphError, GraphHandle};

type Decoder<T> = Box<dyn Fn(Row) -> Result<T, GraphError> + Send + Sync>;

struct Pager<T> {
    handle: GraphHandle,
    /// Must end with `SKIP $skip LIMIT $limit`.
    cypher: String,
    params: Vec<(String, BoltType)>,
    decode: Decoder<T>,
    skip: usize,
    buffer: VecDeque<Row>,
    exhausted: bool,
}

/// Stream the rows of a paged query, fetching the next page only once the
/// current one is consumed. The stream ends after the first short page.
pub(crate) fn paged<T, F>(
    handle: GraphHandle,
    cypher: String,
    params: Vec<(String, BoltType)>,
    decode: F,
) -> BoxStream<'static, Result<T, GraphError>>
where
    T: Send + 'static,
    F: Fn(Row) -> Result<T, GraphError> + Send + Sync + 'static,
{
    let pager = Pager {
        handle,
        cypher,
        params,
        decode: Box::new(decode),
        skip: 0,
        buffer: VecDeque::new(),
        exhausted: false,
    };
    stream::try_unfold(pager, next_item).boxed()
}

async fn next_item<T>(mut pager: Pager<T>) -> Result<Option<(T, Pager<T>)>, GraphError> {
    loop {
        if let Some(row) = pager.buffer.pop_front() {
            let item = (pager.decode)(row)?;
            return Ok(Some((item, pager)));
        }
        if pager.exhausted {
            return Ok(None);
        }

        let page_size = pager.handle.fetch_size();
        let mut q = query(&pager.cypher)
            .param("skip", pager.skip as i64)
            .param("limit", page_size as i64);
        for (key, value) in &pager.params {
            q = q.param(key.as_str(), value.clone());
        }

        let rows = pager.handle.query_rows(q).await?;
        tracing::trace!(skip = pager.skip, rows = rows.len(), "Fetched page");
        pager.skip += rows.len();
        pager.exhausted = rows.len() < page_size;
        pager.buffer.extend(rows);
    }
}
