//! Demo callables registered by the `taskrow` binary.
//!
//! Handy for smoke-testing a deployment and exercised by the integration
//! tests; real deployments register their own callables instead.

use taskrow_core::TaskArgs;

use crate::registry::{CallableRegistry, CallableResult};

/// Register all demo callables
pub fn register(registry: &CallableRegistry) {
    registry.register_fn("demo.echo", echo);
    registry.register_fn("demo.sleep", sleep);
    registry.register_fn("demo.fail", fail);
    registry.register_fn("demo.abort", abort);
    registry.register_streaming("demo.count", |args| Box::new(count(args)));
}

/// Returns the `message` argument; logs it to stdout on the way
fn echo(args: &TaskArgs) -> CallableResult {
    let message = match args.get("message") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    println!("echoing message: {message}");
    Ok(message)
}

/// Blocks for `seconds` (default 1); used to exercise the timeout path
fn sleep(args: &TaskArgs) -> CallableResult {
    let seconds = args.get("seconds").and_then(|v| v.as_u64()).unwrap_or(1);
    std::thread::sleep(std::time::Duration::from_secs(seconds));
    Ok(format!("slept {seconds}s"))
}

/// Always fails with the `message` argument (default "demo failure")
fn fail(args: &TaskArgs) -> CallableResult {
    let message = args
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("demo failure");
    Err(message.to_string())
}

/// Kills the execution subprocess without writing any result back,
/// simulating a hard crash; `code` defaults to 3
fn abort(args: &TaskArgs) -> CallableResult {
    let code = args.get("code").and_then(|v| v.as_i64()).unwrap_or(3);
    std::process::exit(code as i32);
}

/// Streams "1\n" through "n\n" (default 3). With `fail_at` set, errors out
/// after that many chunks, leaving partial output behind.
fn count(args: &TaskArgs) -> impl Iterator<Item = CallableResult> + Send {
    let n = args.get("n").and_then(|v| v.as_u64()).unwrap_or(3);
    let fail_at = args.get("fail_at").and_then(|v| v.as_u64());
    (1..=n).map(move |i| match fail_at {
        Some(limit) if i > limit => Err(format!("counting failed at {i}")),
        _ => Ok(format!("{i}\n")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args_of(value: serde_json::Value) -> TaskArgs {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_echo_returns_message() {
        assert_eq!(
            echo(&args_of(json!({"message": "hi"}))),
            Ok("hi".to_string())
        );
        assert_eq!(echo(&TaskArgs::new()), Ok(String::new()));
    }

    #[test]
    fn test_count_streams_and_fails_on_request() {
        let chunks: Vec<_> = count(&args_of(json!({"n": 2}))).collect();
        assert_eq!(chunks, vec![Ok("1\n".into()), Ok("2\n".into())]);

        let chunks: Vec<_> = count(&args_of(json!({"n": 3, "fail_at": 1}))).collect();
        assert_eq!(chunks[0], Ok("1\n".into()));
        assert!(chunks[1].is_err());
    }

    #[test]
    fn test_fail_uses_custom_message() {
        assert_eq!(
            fail(&args_of(json!({"message": "nope"}))),
            Err("nope".to_string())
        );
        assert_eq!(fail(&TaskArgs::new()), Err("demo failure".to_string()));
    }
}
