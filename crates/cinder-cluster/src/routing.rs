//! Key extraction for cluster routing.
//!
//! Given a command, this module answers one question: which byte strings
//! decide where the command goes? The answer has two parts, a per-command
//! descriptor ([`KeyPattern`]) saying where the keys live in the argument
//! list, and the hash-tag rule trimming each key down to the bytes that
//! actually get hashed.
//!
//! Whether the extracted keys must agree on a *slot* or on a *ring node* is
//! the router's concern; extraction itself is regime-neutral.

use bytes::Bytes;
use cinder_protocol::Command;

/// Errors raised while extracting routing keys from a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    /// The command is never routable on a cluster.
    #[error("command {0} cannot be routed on a cluster")]
    Unroutable(String),

    /// The command's descriptor expects key arguments that are missing.
    #[error("command {0} has no key arguments")]
    MissingKeys(String),

    /// An EVAL-style command declared a key count that is not a positive
    /// integer or does not match the arguments present.
    #[error("command {0} declares an invalid key count")]
    BadKeyCount(String),
}

/// Where a command's routing keys live in its argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPattern {
    /// The first argument is the only routing key (GET, SET, ...).
    FirstKey,

    /// Every argument is a key (DEL, MGET, SINTERSTORE, ...). Routable only
    /// if all keys agree on a target.
    AllKeys,

    /// Keys sit at `offset`, `offset + step`, ... (MSET has step 2).
    Interleaved { step: usize, offset: usize },

    /// The key is the argument at a fixed position (OBJECT ENCODING <key>).
    KeyAt(usize),

    /// Argument 1 declares how many keys follow it (EVAL, EVALSHA).
    KeyCountPrefixed,

    /// Explicitly never routable (admin, transactions, pubsub).
    Unroutable,
}

/// Looks up the routing descriptor for a canonical (uppercase) command id.
///
/// Unknown commands return `None` and are refused rather than guessed at.
pub fn pattern_for(id: &str) -> Option<KeyPattern> {
    use KeyPattern::*;

    let pattern = match id {
        // strings
        "GET" | "SET" | "SETNX" | "SETEX" | "PSETEX" | "GETSET" | "GETDEL" | "APPEND"
        | "STRLEN" | "GETRANGE" | "SETRANGE" | "INCR" | "DECR" | "INCRBY" | "DECRBY"
        | "INCRBYFLOAT" => FirstKey,

        // generic key commands
        "EXPIRE" | "PEXPIRE" | "EXPIREAT" | "PEXPIREAT" | "PERSIST" | "TTL" | "PTTL"
        | "TYPE" | "DUMP" | "RESTORE" => FirstKey,

        // lists
        "LPUSH" | "RPUSH" | "LPUSHX" | "RPUSHX" | "LPOP" | "RPOP" | "LRANGE" | "LLEN"
        | "LINDEX" | "LINSERT" | "LREM" | "LSET" | "LTRIM" => FirstKey,

        // hashes
        "HGET" | "HSET" | "HSETNX" | "HDEL" | "HEXISTS" | "HGETALL" | "HKEYS" | "HVALS"
        | "HLEN" | "HMGET" | "HMSET" | "HINCRBY" | "HINCRBYFLOAT" => FirstKey,

        // sets
        "SADD" | "SREM" | "SMEMBERS" | "SCARD" | "SISMEMBER" | "SPOP" | "SRANDMEMBER" => FirstKey,

        // sorted sets
        "ZADD" | "ZREM" | "ZSCORE" | "ZRANK" | "ZREVRANK" | "ZRANGE" | "ZREVRANGE"
        | "ZRANGEBYSCORE" | "ZREVRANGEBYSCORE" | "ZCARD" | "ZCOUNT" | "ZINCRBY" => FirstKey,

        // SORT's key comes first; BY/GET options never influence routing
        "SORT" => KeyAt(0),

        // subcommand first, key second
        "OBJECT" => KeyAt(1),

        // every argument is a key
        "DEL" | "UNLINK" | "EXISTS" | "MGET" | "TOUCH" | "SINTER" | "SUNION" | "SDIFF"
        | "SINTERSTORE" | "SUNIONSTORE" | "SDIFFSTORE" | "RPOPLPUSH" | "RENAME"
        | "RENAMENX" => AllKeys,

        // key/value pairs
        "MSET" | "MSETNX" => Interleaved { step: 2, offset: 0 },

        // scripting: arg 1 is the key count
        "EVAL" | "EVALSHA" => KeyCountPrefixed,

        // keyless or server-wide: never routable on a cluster
        "PING" | "ECHO" | "AUTH" | "SELECT" | "INFO" | "DBSIZE" | "FLUSHALL" | "FLUSHDB"
        | "KEYS" | "SCAN" | "RANDOMKEY" | "BGSAVE" | "BGREWRITEAOF" | "CONFIG" | "CLIENT"
        | "CLUSTER" | "SLOWLOG" | "SHUTDOWN" | "MULTI" | "EXEC" | "DISCARD" | "WATCH"
        | "UNWATCH" | "SUBSCRIBE" | "UNSUBSCRIBE" | "PUBLISH" => Unroutable,

        _ => return None,
    };
    Some(pattern)
}

/// Applies the hash-tag rule to a routing key.
///
/// If the key contains `{` followed later by `}` with at least one byte in
/// between, only the bytes strictly between the first `{` and the first
/// subsequent `}` are hashed. This is how callers force related keys onto
/// one shard (`{user1000}.following`, `{user1000}.followers`).
pub fn hash_tag(key: &[u8]) -> &[u8] {
    let Some(open) = key.iter().position(|&b| b == b'{') else {
        return key;
    };
    let after_open = &key[open + 1..];
    let Some(close) = after_open.iter().position(|&b| b == b'}') else {
        return key;
    };
    // empty tag ("foo{}bar") hashes the whole key
    if close == 0 {
        return key;
    }
    &after_open[..close]
}

/// Extracts the routing keys of a command per its descriptor.
///
/// Returns at least one key on success. The caller hashes each key (after
/// [`hash_tag`]) and enforces its regime's same-target rule.
pub fn routing_keys(cmd: &Command) -> Result<Vec<&Bytes>, RoutingError> {
    let args = cmd.args();
    let pattern =
        pattern_for(cmd.id()).ok_or_else(|| RoutingError::Unroutable(cmd.id().to_string()))?;

    let keys: Vec<&Bytes> = match pattern {
        KeyPattern::Unroutable => return Err(RoutingError::Unroutable(cmd.id().to_string())),

        KeyPattern::FirstKey => args.first().into_iter().collect(),

        KeyPattern::AllKeys => args.iter().collect(),

        KeyPattern::Interleaved { step, offset } => {
            args.iter().skip(offset).step_by(step).collect()
        }

        KeyPattern::KeyAt(index) => args.get(index).into_iter().collect(),

        KeyPattern::KeyCountPrefixed => {
            let declared = args
                .get(1)
                .and_then(|raw| std::str::from_utf8(raw).ok())
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| RoutingError::BadKeyCount(cmd.id().to_string()))?;
            if declared == 0 {
                return Err(RoutingError::MissingKeys(cmd.id().to_string()));
            }
            let keys = args
                .get(2..2 + declared)
                .ok_or_else(|| RoutingError::BadKeyCount(cmd.id().to_string()))?;
            keys.iter().collect()
        }
    };

    if keys.is_empty() {
        return Err(RoutingError::MissingKeys(cmd.id().to_string()));
    }
    Ok(keys)
}
