//! Thin wrapper over the shared KV backend every concurrency-sensitive
//! component depends on: the rate limiter's atomic INCR+EXPIRE, the
//! read-through cache's pattern-delete invalidation, and the scheduler's
//! cluster-wide advisory locks.
//!
//! Redis was chosen over a pure in-process store because every operation
//! here needs to be atomic and visible across every server instance in the
//! cluster, not just the process that served the request.

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::AppError;

#[derive(Clone)]
pub struct KvStore {
  conn: Arc<Mutex<MultiplexedConnection>>,
  prefix: String,
}

impl KvStore {
  pub async fn connect(url: &str, prefix: &str) -> Result<Self, AppError> {
    let client = Client::open(url)?;
    let conn = client.get_multiplexed_async_connection().await?;
    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
      prefix: prefix.to_string(),
    })
  }

  fn full_key(&self, key: &str) -> String {
    format!("{}:{}", self.prefix, key)
  }

  pub async fn set_json<T: Serialize>(&self, key: &str, val: &T, ttl_s: u64) -> Result<(), AppError> {
    let mut conn = self.conn.lock().await;
    let data = serde_json::to_vec(val)?;
    conn.set_ex::<_, _, ()>(self.full_key(key), data, ttl_s).await?;
    Ok(())
  }

  pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
    let mut conn = self.conn.lock().await;
    let data: Option<Vec<u8>> = conn.get(self.full_key(key)).await?;
    match data {
      Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      None => Ok(None),
    }
  }

  pub async fn del(&self, key: &str) -> Result<bool, AppError> {
    let mut conn = self.conn.lock().await;
    let deleted: bool = conn.del(self.full_key(key)).await?;
    Ok(deleted)
  }

  /// Atomic increment used by the rate limiter's hourly/daily buckets. Sets
  /// an expiry the first time a bucket is created so counters vanish with
  /// their wall-clock window.
  pub async fn incr_with_expiry(&self, key: &str, ttl_s: u64) -> Result<i64, AppError> {
    let full_key = self.full_key(key);
    let mut conn = self.conn.lock().await;
    let script = redis::Script::new(
      r#"
      local v = redis.call("INCR", KEYS[1])
      if v == 1 then
        redis.call("EXPIRE", KEYS[1], ARGV[1])
      end
      return v
      "#,
    );
    let value: i64 = script.key(&full_key).arg(ttl_s).invoke_async(&mut *conn).await?;
    Ok(value)
  }

  /// Deletes every key matching `pattern` (after prefixing), used to
  /// invalidate every cache entry for a (tenant, model) on a successful
  /// write. Uses non-blocking SCAN rather than KEYS.
  pub async fn del_pattern(&self, pattern: &str) -> Result<u64, AppError> {
    let full_pattern = self.full_key(pattern);
    let mut conn = self.conn.lock().await;

    let mut cursor = 0u64;
    let mut keys_to_delete = Vec::new();
    loop {
      let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
        .arg(cursor)
        .arg("MATCH")
        .arg(&full_pattern)
        .arg("COUNT")
        .arg(200)
        .query_async(&mut *conn)
        .await?;
      keys_to_delete.extend(batch);
      cursor = next_cursor;
      if cursor == 0 {
        break;
      }
    }

    if keys_to_delete.is_empty() {
      return Ok(0);
    }
    let deleted: u64 = conn.del(&keys_to_delete).await?;
    Ok(deleted)
  }

  /// Best-effort cluster-wide advisory lock: `SET key token NX EX ttl`.
  /// Used by the scheduler to keep each periodic job singleton across the
  /// cluster.
  pub async fn try_lock(&self, resource: &str, ttl_s: u64, token: &str) -> Result<bool, AppError> {
    let full_key = self.full_key(&format!("lock:{resource}"));
    let mut conn = self.conn.lock().await;
    let script = redis::Script::new(
      r#"
      if redis.call("SET", KEYS[1], ARGV[1], "NX", "EX", ARGV[2]) then
        return 1
      else
        return 0
      end
      "#,
    );
    let result: i32 = script
      .key(&full_key)
      .arg(token)
      .arg(ttl_s as i64)
      .invoke_async(&mut *conn)
      .await?;
    Ok(result == 1)
  }

  /// Releases a lock iff it is still held by `token`, so a straggling
  /// holder past its deadline cannot release a lock someone else now owns.
  pub async fn release_lock(&self, resource: &str, token: &str) -> Result<bool, AppError> {
    let full_key = self.full_key(&format!("lock:{resource}"));
    let mut conn = self.conn.lock().await;
    let script = redis::Script::new(
      r#"
      if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
      else
        return 0
      end
      "#,
    );
    let result: i32 = script.key(&full_key).arg(token).invoke_async(&mut *conn).await?;
    Ok(result == 1)
  }
}
