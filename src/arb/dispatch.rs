//! Parsing of textual method calls and the closed table of server operations.
//!
//! A request looks like `name(arg, 'quoted arg', 42, True)`. Arguments are
//! literals only: quoted strings, integers, floats, `True`/`False`, `None`, or
//! a bare word which is taken as a string.

use super::error::ProtocolError;
use super::node::NodeState;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, LazyLock};

/// Payload that tells the client the server is shutting down.
pub const DYING: &str = "DYING";

static CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)\s*$").expect("valid regex")
});

/// One literal argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
}

impl Literal {
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Str(_) => "string",
            Literal::Int(_) => "integer",
            Literal::Float(_) => "float",
            Literal::Bool(_) => "boolean",
            Literal::None => "None",
        }
    }

    fn from_bare(token: &str) -> Self {
        match token {
            "True" | "true" => Literal::Bool(true),
            "False" | "false" => Literal::Bool(false),
            "None" => Literal::None,
            _ => {
                if let Ok(i) = token.parse::<i64>() {
                    Literal::Int(i)
                } else if let Ok(f) = token.parse::<f64>() {
                    Literal::Float(f)
                } else {
                    Literal::Str(token.to_string())
                }
            }
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "{}", s),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::None => write!(f, "None"),
        }
    }
}

/// A parsed request.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub name: String,
    pub args: Vec<Literal>,
}

impl MethodCall {
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let caps = CALL_RE
            .captures(input)
            .ok_or_else(|| ProtocolError::Malformed(format!("{:?}", input.trim())))?;

        Ok(Self {
            name: caps[1].to_string(),
            args: split_args(&caps[2])?,
        })
    }
}

/// Split an argument list on top-level commas, honouring quotes.
fn split_args(raw: &str) -> Result<Vec<Literal>, ProtocolError> {
    let mut args = Vec::new();
    let mut chars = raw.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            break;
        };

        let literal = if first == '\'' || first == '"' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some(other) => value.push(other),
                        None => break,
                    },
                    c if c == first => {
                        closed = true;
                        break;
                    }
                    c => value.push(c),
                }
            }
            if !closed {
                return Err(ProtocolError::Malformed(format!(
                    "unterminated string in ({})",
                    raw
                )));
            }
            Literal::Str(value)
        } else {
            let mut token = String::new();
            while let Some(c) = chars.next_if(|&c| c != ',') {
                token.push(c);
            }
            let token = token.trim();
            if token.is_empty() {
                return Err(ProtocolError::Malformed(format!("empty argument in ({})", raw)));
            }
            Literal::from_bare(token)
        };
        args.push(literal);

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some(',') => {}
            Some(c) => {
                return Err(ProtocolError::Malformed(format!(
                    "unexpected '{}' after argument {} in ({})",
                    c,
                    args.len(),
                    raw
                )));
            }
        }
    }

    Ok(args)
}

/// Server-side operation: receives exactly `arity` arguments.
pub type HandlerFn = Arc<dyn Fn(&[Literal]) -> Result<String, ProtocolError> + Send + Sync>;

#[derive(Clone)]
struct Handler {
    arity: usize,
    func: HandlerFn,
}

/// Closed whitelist of operations a peer may invoke.
#[derive(Clone, Default)]
pub struct CommandTable {
    handlers: BTreeMap<String, Handler>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard operations every node answers.
    pub fn builtin(state: NodeState) -> Self {
        let mut table = Self::new();

        table.register("get_response", 1, |args| {
            Ok(format!("IT WURKS! {}", args[0]))
        });

        table.register("ping", 0, |_| Ok("PONG".to_string()));

        let runs = state.clone();
        table.register("active_runs", 0, move |_| {
            Ok(runs.active_runs().to_string())
        });

        let runs = state.clone();
        table.register("start_run", 1, move |args| {
            let name = expect_str("start_run", args, 0)?;
            Ok(runs.begin_run(name).to_string())
        });

        let runs = state.clone();
        table.register("finish_run", 1, move |args| {
            let id = expect_int("finish_run", args, 0)?;
            let finished = u64::try_from(id).is_ok_and(|id| runs.finish_run(id));
            if !finished {
                return Err(ProtocolError::Execution {
                    method: "finish_run".to_string(),
                    message: format!("no running task with id {}", id),
                });
            }
            Ok("OK".to_string())
        });

        table.register("view_running_tasks", 0, move |_| {
            let tasks = state.running_tasks();
            if tasks.is_empty() {
                return Ok("No running tasks".to_string());
            }
            Ok(tasks
                .iter()
                .map(|t| format!("{}: {} (since {})", t.id, t.name, t.started_at.to_rfc3339()))
                .collect::<Vec<_>>()
                .join("\n"))
        });

        table.register("shutdown", 0, |_| Ok(DYING.to_string()));

        table
    }

    /// Add or replace an operation.
    pub fn register<F>(&mut self, name: &str, arity: usize, func: F)
    where
        F: Fn(&[Literal]) -> Result<String, ProtocolError> + Send + Sync + 'static,
    {
        self.handlers.insert(
            name.to_string(),
            Handler {
                arity,
                func: Arc::new(func),
            },
        );
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Parse and run one request.
    pub fn dispatch(&self, request: &str) -> Result<String, ProtocolError> {
        let call = MethodCall::parse(request)?;
        let handler = self
            .handlers
            .get(&call.name)
            .ok_or_else(|| ProtocolError::UnknownMethod(call.name.clone()))?;

        if call.args.len() != handler.arity {
            return Err(ProtocolError::Arity {
                method: call.name,
                expected: handler.arity,
                given: call.args.len(),
            });
        }

        match catch_unwind(AssertUnwindSafe(|| (handler.func)(&call.args))) {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                Err(ProtocolError::Execution {
                    method: call.name,
                    message,
                })
            }
        }
    }

    /// Like [`dispatch`](Self::dispatch), but every failure becomes a
    /// descriptive `ERROR: ...` payload.
    pub fn respond(&self, request: &str) -> String {
        self.dispatch(request)
            .unwrap_or_else(|e| format!("ERROR: {}", e))
    }
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTable")
            .field("handlers", &self.names())
            .finish()
    }
}

/// Require argument `index` to be a string.
pub fn expect_str<'a>(
    method: &str,
    args: &'a [Literal],
    index: usize,
) -> Result<&'a str, ProtocolError> {
    match args.get(index) {
        Some(Literal::Str(s)) => Ok(s),
        other => Err(ProtocolError::ArgumentType {
            method: method.to_string(),
            index,
            expected: "string",
            found: other.map(Literal::type_name).unwrap_or("nothing"),
        }),
    }
}

/// Render `value` as a quoted string argument that parses back unchanged.
pub fn quote_str(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// Require argument `index` to be an integer.
pub fn expect_int(method: &str, args: &[Literal], index: usize) -> Result<i64, ProtocolError> {
    match args.get(index) {
        Some(Literal::Int(i)) => Ok(*i),
        other => Err(ProtocolError::ArgumentType {
            method: method.to_string(),
            index,
            expected: "integer",
            found: other.map(Literal::type_name).unwrap_or("nothing"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_without_args() {
        let call = MethodCall::parse("view_running_tasks()").unwrap();
        assert_eq!(call.name, "view_running_tasks");
        assert!(call.args.is_empty());
    }

    #[test]
    fn parses_mixed_literals() {
        let call = MethodCall::parse(r#"  f( hello, 'a, b', "it's", 42, -1.5, True, None )  "#)
            .unwrap();
        assert_eq!(
            call.args,
            vec![
                Literal::Str("hello".to_string()),
                Literal::Str("a, b".to_string()),
                Literal::Str("it's".to_string()),
                Literal::Int(42),
                Literal::Float(-1.5),
                Literal::Bool(true),
                Literal::None,
            ]
        );
    }

    #[test]
    fn parses_escapes_and_trailing_comma() {
        let call = MethodCall::parse(r"f('a\'b\n',)").unwrap();
        assert_eq!(call.args, vec![Literal::Str("a'b\n".to_string())]);
    }

    #[test]
    fn rejects_malformed_calls() {
        for bad in ["", "noparens", "f(", "1abc()", "f('open)", "f(a,,b)", "f('a' b)"] {
            assert!(
                matches!(MethodCall::parse(bad), Err(ProtocolError::Malformed(_))),
                "{:?} should be malformed",
                bad
            );
        }
    }

    #[test]
    fn get_response_echoes_bare_word() {
        let table = CommandTable::builtin(NodeState::new());
        assert_eq!(table.respond("get_response(hello)"), "IT WURKS! hello");
    }

    #[test]
    fn unknown_method_is_error_payload() {
        let table = CommandTable::builtin(NodeState::new());
        let reply = table.respond("format_disk()");
        assert!(reply.starts_with("ERROR: "));
        assert!(reply.contains("unknown method 'format_disk'"));
    }

    #[test]
    fn wrong_arity_is_error_payload() {
        let table = CommandTable::builtin(NodeState::new());
        let reply = table.respond("get_response()");
        assert_eq!(
            reply,
            "ERROR: get_response() takes 1 argument(s) but 0 were given"
        );
    }

    #[test]
    fn handler_failures_and_panics_are_contained() {
        let mut table = CommandTable::new();
        table.register("fails", 0, |_| {
            Err(ProtocolError::Execution {
                method: "fails".to_string(),
                message: "device offline".to_string(),
            })
        });
        table.register("explodes", 0, |_| panic!("boom"));

        assert_eq!(table.respond("fails()"), "ERROR: fails() failed: device offline");
        assert_eq!(table.respond("explodes()"), "ERROR: explodes() failed: boom");
    }

    #[test]
    fn typed_argument_helper() {
        let mut table = CommandTable::new();
        table.register("shout", 1, |args| {
            Ok(expect_str("shout", args, 0)?.to_uppercase())
        });

        assert_eq!(table.respond("shout('hi')"), "HI");
        assert_eq!(
            table.respond("shout(3)"),
            "ERROR: argument 0 of shout() must be string, got integer"
        );
    }

    #[test]
    fn run_commands_reflect_node_state() {
        let state = NodeState::new();
        let table = CommandTable::builtin(state.clone());
        assert_eq!(table.respond("active_runs()"), "0");
        assert_eq!(table.respond("view_running_tasks()"), "No running tasks");

        let _ticket = state.start_run("boot-test");
        assert_eq!(table.respond("active_runs()"), "1");
        assert!(table.respond("view_running_tasks()").contains("boot-test"));
    }

    #[test]
    fn shutdown_replies_dying() {
        let table = CommandTable::builtin(NodeState::new());
        assert_eq!(table.respond("shutdown()"), DYING);
        assert!(table.names().contains(&"shutdown"));
    }

    #[test]
    fn runs_registered_remotely_are_counted() {
        let state = NodeState::new();
        let table = CommandTable::builtin(state.clone());

        let id = table.respond("start_run('boot-test')");
        assert_eq!(state.active_runs(), 1);
        assert!(table.respond("view_running_tasks()").contains("boot-test"));

        assert_eq!(table.respond(&format!("finish_run({})", id)), "OK");
        assert_eq!(state.active_runs(), 0);
        assert_eq!(
            table.respond(&format!("finish_run({})", id)),
            format!("ERROR: finish_run() failed: no running task with id {}", id)
        );
        assert_eq!(
            table.respond("finish_run('x')"),
            "ERROR: argument 0 of finish_run() must be integer, got string"
        );
    }

    #[test]
    fn quoted_strings_parse_back_unchanged() {
        let awkward = "it's a \\path\\ with\nnewline, commas";
        let call = MethodCall::parse(&format!("f({})", quote_str(awkward))).unwrap();
        assert_eq!(call.args, vec![Literal::Str(awkward.to_string())]);
    }
}
