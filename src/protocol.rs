//! Wire message model and the defensive parsers for pool responses.
//!
//! Stratum pools disagree wildly on message shapes: difficulty arrives as a
//! string or a number, subscribe results nest their parameters one, two or
//! three lists deep, and extranonce lengths are sometimes miscalculated.
//! Everything here is written to extract what it can and to report clearly
//! when a payload is not what it claims to be.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved request ids. Everything at or above [`ids::SUBMIT_BASE`] is a
/// share submission, correlated to its accept/reject response by id.
pub mod ids {
    /// JSON-RPC 2.0 login
    pub const LOGIN: u64 = 1;
    /// mining.subscribe
    pub const SUBSCRIBE: u64 = 2;
    /// mining.authorize
    pub const AUTHORIZE: u64 = 3;
    /// mining.ping
    pub const PING: u64 = 4;
    /// First share submission id
    pub const SUBMIT_BASE: u64 = 20;
}

/// Stratum method names
pub mod methods {
    pub const SUBSCRIBE: &str = "mining.subscribe";
    pub const AUTHORIZE: &str = "mining.authorize";
    pub const SUBMIT: &str = "mining.submit";
    pub const NOTIFY: &str = "mining.notify";
    pub const SET_DIFFICULTY: &str = "mining.set_difficulty";
    pub const SET_EXTRANONCE: &str = "mining.set_extranonce";
    pub const PING: &str = "mining.ping";
    pub const PONG: &str = "mining.pong";
    pub const LOGIN: &str = "login";
    pub const JOB: &str = "job";
    pub const RECONNECT: &str = "client.reconnect";
    pub const SHOW_MESSAGE: &str = "client.show_message";
}

/// One line of the wire protocol, loose enough to hold requests, responses
/// and notifications from any pool implementation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// JavaScript-style truthiness, which is what real pool servers were written
/// against: null/false/0/"" are falsy, arrays and objects are always truthy.
pub fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn request(id: u64, method: &str, params: Value) -> WireMessage {
    WireMessage {
        id: Some(Value::from(id)),
        method: Some(method.to_string()),
        params: Some(params),
        result: None,
        error: None,
    }
}

impl WireMessage {
    /// A message carrying none of id/error/result/method is malformed.
    pub fn is_wellformed(&self) -> bool {
        truthy(self.id.as_ref())
            || truthy(self.error.as_ref())
            || truthy(self.result.as_ref())
            || self.method.as_deref().map_or(false, |m| !m.is_empty())
    }

    pub fn id_u64(&self) -> Option<u64> {
        self.id.as_ref()?.as_u64()
    }

    pub fn result_truthy(&self) -> bool {
        truthy(self.result.as_ref())
    }

    /// JSON-RPC 2.0 login request (id 1).
    pub fn login(username: &str, password: &str, agent: &str) -> Self {
        request(
            ids::LOGIN,
            methods::LOGIN,
            serde_json::json!({
                "login": username,
                "pass": password,
                "agent": agent,
            }),
        )
    }

    /// mining.subscribe request (id 2), optionally resuming a session.
    pub fn subscribe(agent: &str, session_id: Option<&str>) -> Self {
        let mut params = vec![Value::String(agent.to_string())];
        if let Some(session) = session_id {
            params.push(Value::String(session.to_string()));
        }
        request(ids::SUBSCRIBE, methods::SUBSCRIBE, Value::Array(params))
    }

    /// mining.authorize request (id 3).
    pub fn authorize(username: &str, password: &str) -> Self {
        request(
            ids::AUTHORIZE,
            methods::AUTHORIZE,
            Value::Array(vec![
                Value::String(username.to_string()),
                Value::String(password.to_string()),
            ]),
        )
    }

    /// mining.ping request (id 4).
    pub fn ping() -> Self {
        request(ids::PING, methods::PING, Value::Array(vec![]))
    }

    /// Pong-shaped response to a server-issued ping, correlated to whatever
    /// id the server used (some pools ping without one).
    pub fn pong(id: Option<Value>) -> Self {
        WireMessage {
            id: Some(id.unwrap_or(Value::Null)),
            method: None,
            params: None,
            result: Some(Value::String("pong".to_string())),
            error: Some(Value::Null),
        }
    }

    /// mining.submit request carrying the given share id.
    pub fn submit(worker: &str, share: &Share, id: u64) -> Self {
        request(
            id,
            methods::SUBMIT,
            Value::Array(vec![
                Value::String(worker.to_string()),
                Value::String(share.job_id.clone()),
                Value::String(share.nonce2.clone()),
                Value::String(share.ntime.clone()),
                Value::String(share.nonce.clone()),
            ]),
        )
    }
}

/// Share to submit to the pool (legacy dialect).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Share {
    /// Job reference from the job this share solves
    pub job_id: String,
    /// Primary nonce
    pub nonce: String,
    /// Secondary (extra) nonce
    pub nonce2: String,
    /// Timestamp field of the solved work
    pub ntime: String,
}

impl Share {
    /// All four fields are required for submission.
    pub fn is_complete(&self) -> bool {
        !self.job_id.is_empty()
            && !self.nonce.is_empty()
            && !self.nonce2.is_empty()
            && !self.ntime.is_empty()
    }
}

/// Numeric value, tolerating the numeric strings some pools send.
fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// One recognized entry of a subscribe result, at whatever nesting level it
/// was found.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscribeEntry {
    Difficulty(f64),
    Session(String),
    Scalar(Value),
}

/// Everything a subscribe response scan could recover.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscribeInfo {
    pub difficulty: Option<f64>,
    pub session_id: Option<String>,
    /// Leftover scalar entries, in order; candidate extranonce parameters.
    pub extranonce: Vec<Value>,
}

fn classify_pair(pair: &[Value]) -> Option<SubscribeEntry> {
    let name = pair.first()?.as_str()?;
    let value = pair.get(1)?;
    match name {
        methods::SET_DIFFICULTY => value_as_f64(value).map(SubscribeEntry::Difficulty),
        methods::NOTIFY => Some(SubscribeEntry::Session(value_text(value))),
        _ => None,
    }
}

fn apply(info: &mut SubscribeInfo, entry: Option<SubscribeEntry>) {
    match entry {
        Some(SubscribeEntry::Difficulty(d)) if info.difficulty.is_none() => {
            info.difficulty = Some(d)
        }
        Some(SubscribeEntry::Session(s)) if info.session_id.is_none() => {
            info.session_id = Some(s)
        }
        _ => {}
    }
}

/// Scan a mining.subscribe result for difficulty, session id and extranonce
/// parameters. Pools nest these one, two or three lists deep; the first
/// occurrence of each wins. Objects are ignored; remaining scalars are
/// collected for the extranonce parser.
pub fn scan_subscribe_result(result: &Value) -> SubscribeInfo {
    let mut info = SubscribeInfo::default();
    let Some(entries) = result.as_array() else {
        return info;
    };
    for entry in entries {
        match entry {
            Value::Array(inner) => {
                if inner.iter().any(Value::is_array) {
                    // fully nested: a list of ["method", value] pairs
                    for sub in inner {
                        if let Some(pair) = sub.as_array() {
                            apply(&mut info, classify_pair(pair));
                        }
                    }
                } else {
                    // the entry is itself a ["method", value] pair
                    apply(&mut info, classify_pair(inner));
                }
            }
            Value::Object(_) => {}
            scalar => info.extranonce.push(scalar.clone()),
        }
    }
    info
}

/// Result of an extranonce parameter parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtranonceOutcome {
    /// Normalized extranonce to store.
    Updated(String),
    /// Recognized but nothing to apply (too few parameters).
    Unchanged,
    /// First parameter is not valid hexadecimal; caller treats the command
    /// as unprocessed.
    NotHex,
}

/// Parse `[hex_string, declared_byte_length]` extranonce parameters.
///
/// The value is padded with a leading `'0'` if odd-length, then left-padded
/// to `2 * declared_byte_length` hex characters. The declared length falls
/// back to the string's own length when it is not numeric. Never truncates,
/// so a pool that miscalculates its extranonce size cannot shrink ours.
pub fn parse_extranonce(params: &[Value]) -> ExtranonceOutcome {
    if params.len() < 2 {
        return ExtranonceOutcome::Unchanged;
    }
    let Some(hex_str) = params[0].as_str() else {
        return ExtranonceOutcome::NotHex;
    };
    if hex_str.is_empty() || !hex_str.chars().all(|c| c.is_ascii_hexdigit()) {
        return ExtranonceOutcome::NotHex;
    }

    let target_len = match value_as_f64(&params[1]) {
        Some(bytes) if bytes >= 0.0 => (2.0 * bytes) as usize,
        _ => hex_str.len(),
    };

    let mut nonce = hex_str.to_string();
    if nonce.len() % 2 == 1 {
        nonce.insert(0, '0');
    }
    while nonce.len() < target_len {
        nonce.insert(0, '0');
    }
    ExtranonceOutcome::Updated(nonce)
}

/// Parse a mining.set_difficulty payload: a single-element list or a bare
/// number. Anything else is unprocessed.
pub fn parse_difficulty(params: Option<&Value>) -> Option<f64> {
    match params? {
        Value::Array(list) => value_as_f64(list.first()?),
        n @ Value::Number(_) => value_as_f64(n),
        _ => None,
    }
}

/// Render a value the way a status line wants it: strings unquoted,
/// everything else as compact JSON.
pub fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn subscribe_result(raw: &str) -> SubscribeInfo {
        let msg: WireMessage = serde_json::from_str(raw).unwrap();
        scan_subscribe_result(msg.result.as_ref().unwrap())
    }

    // Real-world subscribe responses, verbatim from pools in the wild.

    #[test]
    fn test_subscribe_yiimp_string_difficulty() {
        let info = subscribe_result(
            r#"{"id":2,"result":[[["mining.set_difficulty","1.000"],["mining.notify","2344053c4a36e6d748513a8776cde339"]],"81000378",4],"error":null}"#,
        );
        assert_eq!(info.difficulty, Some(1.0));
        assert_eq!(
            info.session_id.as_deref(),
            Some("2344053c4a36e6d748513a8776cde339")
        );
        assert_eq!(info.extranonce, vec![json!("81000378"), json!(4)]);
    }

    #[test]
    fn test_subscribe_nomp_numeric_difficulty() {
        let info = subscribe_result(
            r#"{"id":2,"result":[[["mining.set_difficulty",1.000],["mining.notify","7f7da94d387c442d199eb0fd57f454a1"]],"81000815",4],"error":null}"#,
        );
        assert_eq!(info.difficulty, Some(1.0));
        assert_eq!(
            info.session_id.as_deref(),
            Some("7f7da94d387c442d199eb0fd57f454a1")
        );
    }

    #[test]
    fn test_subscribe_nomp_hex_difficulty_is_ignored() {
        // some nomp pools send a hex blob where the difficulty belongs
        let info = subscribe_result(
            r#"{"id":2,"result":[[["mining.set_difficulty","deadbeefcafebabe0900000000000000"],["mining.notify","deadbeefcafebabe0900000000000000"]],"00000001",4],"error":null}"#,
        );
        assert_eq!(info.difficulty, None);
        assert_eq!(
            info.session_id.as_deref(),
            Some("deadbeefcafebabe0900000000000000")
        );
        assert_eq!(info.extranonce, vec![json!("00000001"), json!(4)]);
    }

    #[test]
    fn test_subscribe_p2pool_two_levels() {
        let info = subscribe_result(
            r#"{"id": 2, "result": [["mining.notify", "ae6812eb4cd7735a302a8a9dd95cf71f"], "78636025", 4], "error": null}"#,
        );
        assert_eq!(info.difficulty, None);
        assert_eq!(
            info.session_id.as_deref(),
            Some("ae6812eb4cd7735a302a8a9dd95cf71f")
        );
        assert_eq!(info.extranonce, vec![json!("78636025"), json!(4)]);
    }

    #[test]
    fn test_subscribe_nicehash() {
        let info = subscribe_result(
            r#"{"id":2,"error":null,"result":[["mining.notify","fa7ce2accc79883ec73bb3d8ebcb2362"],"422dc5397d",3]}"#,
        );
        assert_eq!(
            info.session_id.as_deref(),
            Some("fa7ce2accc79883ec73bb3d8ebcb2362")
        );
        assert_eq!(info.extranonce, vec![json!("422dc5397d"), json!(3)]);
    }

    #[test]
    fn test_subscribe_non_array_result() {
        assert_eq!(scan_subscribe_result(&json!("nope")), SubscribeInfo::default());
        assert_eq!(scan_subscribe_result(&json!({"a":1})), SubscribeInfo::default());
    }

    #[test]
    fn test_subscribe_first_difficulty_wins() {
        let info = scan_subscribe_result(&json!([
            [["mining.set_difficulty", 2.0], ["mining.set_difficulty", 8.0]]
        ]));
        assert_eq!(info.difficulty, Some(2.0));
    }

    #[test]
    fn test_extranonce_basic_and_idempotent() {
        let parsed = parse_extranonce(&[json!("81000378"), json!(4)]);
        assert_eq!(parsed, ExtranonceOutcome::Updated("81000378".to_string()));
        // re-padding an already-correct value changes nothing
        let again = parse_extranonce(&[json!("81000378"), json!(4)]);
        assert_eq!(again, parsed);
    }

    #[test]
    fn test_extranonce_pads_to_declared_length() {
        assert_eq!(
            parse_extranonce(&[json!("1"), json!(4)]),
            ExtranonceOutcome::Updated("00000001".to_string())
        );
        // declared length as a string
        assert_eq!(
            parse_extranonce(&[json!("abc"), json!("3")]),
            ExtranonceOutcome::Updated("000abc".to_string())
        );
    }

    #[test]
    fn test_extranonce_odd_length_gets_even() {
        assert_eq!(
            parse_extranonce(&[json!("fff"), json!("bogus")]),
            ExtranonceOutcome::Updated("0fff".to_string())
        );
    }

    #[test]
    fn test_extranonce_never_truncates() {
        assert_eq!(
            parse_extranonce(&[json!("0011223344"), json!(2)]),
            ExtranonceOutcome::Updated("0011223344".to_string())
        );
    }

    #[test]
    fn test_extranonce_rejects_non_hex() {
        assert_eq!(parse_extranonce(&[json!("xyz"), json!(4)]), ExtranonceOutcome::NotHex);
        assert_eq!(parse_extranonce(&[json!(42), json!(4)]), ExtranonceOutcome::NotHex);
        assert_eq!(parse_extranonce(&[json!(""), json!(4)]), ExtranonceOutcome::NotHex);
    }

    #[test]
    fn test_extranonce_short_params_is_noop() {
        assert_eq!(parse_extranonce(&[json!("0011")]), ExtranonceOutcome::Unchanged);
        assert_eq!(parse_extranonce(&[]), ExtranonceOutcome::Unchanged);
    }

    #[test]
    fn test_difficulty_shapes() {
        assert_eq!(parse_difficulty(Some(&json!([1]))), Some(1.0));
        assert_eq!(parse_difficulty(Some(&json!([0.25, "junk"]))), Some(0.25));
        assert_eq!(parse_difficulty(Some(&json!(["8192"]))), Some(8192.0));
        assert_eq!(parse_difficulty(Some(&json!(16))), Some(16.0));
        assert_eq!(parse_difficulty(Some(&json!(["x"]))), None);
        assert_eq!(parse_difficulty(Some(&json!({"diff":1}))), None);
        assert_eq!(parse_difficulty(None), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(!truthy(None));
        assert!(!truthy(Some(&json!(null))));
        assert!(!truthy(Some(&json!(false))));
        assert!(!truthy(Some(&json!(0))));
        assert!(!truthy(Some(&json!(""))));
        assert!(truthy(Some(&json!(true))));
        assert!(truthy(Some(&json!(1))));
        assert!(truthy(Some(&json!("ok"))));
        assert!(truthy(Some(&json!([]))));
        assert!(truthy(Some(&json!({}))));
    }

    #[test]
    fn test_wellformed() {
        let msg: WireMessage = serde_json::from_str(r#"{"id":3,"result":true}"#).unwrap();
        assert!(msg.is_wellformed());
        let msg: WireMessage = serde_json::from_str(r#"{"something":"else"}"#).unwrap();
        assert!(!msg.is_wellformed());
        let msg: WireMessage = serde_json::from_str(r#"{"id":null,"result":null}"#).unwrap();
        assert!(!msg.is_wellformed());
    }

    #[test]
    fn test_request_builders_serialize_cleanly() {
        let subscribe = WireMessage::subscribe("agent/1.0", Some("deadbeef"));
        assert_eq!(
            serde_json::to_string(&subscribe).unwrap(),
            r#"{"id":2,"method":"mining.subscribe","params":["agent/1.0","deadbeef"]}"#
        );

        let pong = WireMessage::pong(Some(json!(4)));
        assert_eq!(
            serde_json::to_string(&pong).unwrap(),
            r#"{"id":4,"result":"pong","error":null}"#
        );

        let login = WireMessage::login("wallet", "x", "agent/1.0");
        let encoded = serde_json::to_string(&login).unwrap();
        assert!(encoded.contains(r#""method":"login""#));
        assert!(encoded.contains(r#""login":"wallet""#));
    }

    #[test]
    fn test_submit_builder_param_order() {
        let share = Share {
            job_id: "job1".to_string(),
            nonce: "a1b2c3d4".to_string(),
            nonce2: "0001".to_string(),
            ntime: "5e0f1a2b".to_string(),
        };
        let msg = WireMessage::submit("wallet.rig", &share, 20);
        assert_eq!(msg.id_u64(), Some(20));
        assert_eq!(
            msg.params,
            Some(json!(["wallet.rig", "job1", "0001", "5e0f1a2b", "a1b2c3d4"]))
        );
    }

    #[test]
    fn test_share_completeness() {
        let mut share = Share {
            job_id: "j".to_string(),
            nonce: "n".to_string(),
            nonce2: "n2".to_string(),
            ntime: "t".to_string(),
        };
        assert!(share.is_complete());
        share.ntime.clear();
        assert!(!share.is_complete());
    }
}
