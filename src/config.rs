//! Connection parameters

use crate::{Error, Result};
use chrono::FixedOffset;
use std::{fmt, str::FromStr, time::Duration};

const DEFAULT_MIN_SESSIONS      : usize = 1;
const DEFAULT_MAX_SESSIONS      : usize = 1000;
const DEFAULT_SESSION_INCREMENT : usize = 1;
const DEFAULT_WAIT_TIMEOUT      : Duration = Duration::from_secs(30);
const DEFAULT_SESSION_TIMEOUT   : Duration = Duration::from_secs(5 * 60);
const DEFAULT_MAX_LIFETIME      : Duration = Duration::from_secs(60 * 60);
const DEFAULT_CONNECT_RETRIES   : usize = 3;
const DEFAULT_ACQUIRE_ATTEMPTS  : usize = 3;

/// A password that is never printed
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Password(String);

impl Password {
    pub fn new(secret: &str) -> Self {
        Password(secret.to_string())
    }

    /// Returns the secret
    pub fn secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_empty() { "\"\"" } else { "\"SECRET\"" })
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_empty() { "" } else { "SECRET" })
    }
}

/// Administrative privilege of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Default,
    SysDba,
    SysOper,
}

/**
    Everything needed to open sessions and size the pool that holds them.

    Parameters are immutable once a pool is built. Derived variants, like the one
    returned by [`as_sysdba`](ConnectionParams::as_sysdba), are copies.

    # Example

    ```
    use augur::ConnectionParams;
    use std::time::Duration;

    let params = ConnectionParams::builder()
        .username("scott")
        .password("tiger")
        .connect_string("localhost:1521/orclpdb")
        .max_sessions(4)
        .wait_timeout(Duration::from_secs(1))
        .on_init("nls_numeric_characters", ",.")
        .build()?;
    assert_eq!(params.max_sessions(), 4);
    assert_eq!(params.min_sessions(), 1);

    let text = params.to_string();
    assert!(text.contains(r#"user="scott""#));
    assert!(text.contains(r#"password="SECRET""#));

    let parsed = ConnectionParams::parse(&params.string_with_password())?;
    assert_eq!(parsed.password().secret(), "tiger");
    assert_eq!(parsed.max_sessions(), 4);
    # Ok::<(),augur::Error>(())
    ```
*/
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    username:          String,
    password:          Password,
    new_password:      Option<Password>,
    connect_string:    String,
    conn_class:        String,
    auth_mode:         AuthMode,
    prelim:            bool,
    min_sessions:      usize,
    max_sessions:      usize,
    session_increment: usize,
    wait_timeout:      Duration,
    session_timeout:   Duration,
    max_lifetime:      Duration,
    standalone:        bool,
    on_init:           Vec<(String, String)>,
    timezone:          Option<FixedOffset>,
    connect_retries:   usize,
    acquire_attempts:  usize,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            username:          String::new(),
            password:          Password::default(),
            new_password:      None,
            connect_string:    String::new(),
            conn_class:        String::new(),
            auth_mode:         AuthMode::Default,
            prelim:            false,
            min_sessions:      DEFAULT_MIN_SESSIONS,
            max_sessions:      DEFAULT_MAX_SESSIONS,
            session_increment: DEFAULT_SESSION_INCREMENT,
            wait_timeout:      DEFAULT_WAIT_TIMEOUT,
            session_timeout:   DEFAULT_SESSION_TIMEOUT,
            max_lifetime:      DEFAULT_MAX_LIFETIME,
            standalone:        false,
            on_init:           Vec::new(),
            timezone:          None,
            connect_retries:   DEFAULT_CONNECT_RETRIES,
            acquire_attempts:  DEFAULT_ACQUIRE_ATTEMPTS,
        }
    }
}

impl ConnectionParams {
    /// Returns a builder initialized with the default values
    pub fn builder() -> ConnectionParamsBuilder {
        ConnectionParamsBuilder { params: ConnectionParams::default() }
    }

    pub fn username(&self) -> &str { &self.username }
    pub fn password(&self) -> &Password { &self.password }
    /// New password that replaces an expired one when a session is opened
    pub fn new_password(&self) -> Option<&Password> { self.new_password.as_ref() }
    pub fn connect_string(&self) -> &str { &self.connect_string }
    /// Default connection class of the pooled sessions
    pub fn conn_class(&self) -> &str { &self.conn_class }
    pub fn auth_mode(&self) -> AuthMode { self.auth_mode }
    /// Whether sessions are opened in the preliminary mode, which is used to start up an idle instance
    pub fn is_prelim(&self) -> bool { self.prelim }
    pub fn min_sessions(&self) -> usize { self.min_sessions }
    pub fn max_sessions(&self) -> usize { self.max_sessions }
    pub fn session_increment(&self) -> usize { self.session_increment }
    /// How long `get_session` waits for a session when all of them are busy
    pub fn wait_timeout(&self) -> Duration { self.wait_timeout }
    /// How long a session may stay idle before it is closed
    pub fn session_timeout(&self) -> Duration { self.session_timeout }
    /// Maximum age of a session, after which it is retired regardless of its use
    pub fn max_lifetime(&self) -> Duration { self.max_lifetime }
    /// Whether sessions bypass the pool
    pub fn is_standalone(&self) -> bool { self.standalone }
    /// Session parameters set on every new or recycled session
    pub fn on_init(&self) -> &[(String, String)] { &self.on_init }
    /// Session time zone override
    pub fn timezone(&self) -> Option<FixedOffset> { self.timezone }
    pub fn connect_retries(&self) -> usize { self.connect_retries }
    pub fn acquire_attempts(&self) -> usize { self.acquire_attempts }

    /// Returns a copy of the parameters that connects standalone SYSDBA sessions
    pub fn as_sysdba(&self) -> Self {
        let mut params = self.clone();
        params.auth_mode = AuthMode::SysDba;
        params.standalone = true;
        params
    }

    /// Returns a copy of the parameters that connects a preliminary SYSDBA session
    pub fn as_prelim(&self) -> Self {
        let mut params = self.as_sysdba();
        params.prelim = true;
        params
    }

    /// Returns a copy of the parameters with different credentials
    pub fn with_credentials(&self, username: &str, password: &str) -> Self {
        let mut params = self.clone();
        params.username = username.to_string();
        params.password = Password::new(password);
        params.new_password = None;
        params
    }

    /// Returns a copy of the parameters that rotates the password on connect
    pub fn with_new_password(&self, new_password: &str) -> Self {
        let mut params = self.clone();
        params.new_password = Some(Password::new(new_password));
        params
    }

    /// Returns a copy of the parameters that opens a session per request
    pub fn with_standalone(&self, standalone: bool) -> Self {
        let mut params = self.clone();
        params.standalone = standalone;
        params
    }

    /**
        Parses connection parameters.

        Two forms are recognized:
        - space or new line separated `key=value` pairs, where values may be double quoted:
          `user="scott" password="tiger" connectString="db:1521/svc" poolMaxSessions=4`
        - "easy connect" with credentials: `scott/tiger@db:1521/svc`
    */
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if !text.contains('=') {
            return Self::parse_easy_connect(text);
        }
        let mut params = ConnectionParams::default();
        for (key, value) in logfmt_pairs(text)? {
            params.set(&key, &value)?;
        }
        params.validate()?;
        Ok(params)
    }

    fn parse_easy_connect(text: &str) -> Result<Self> {
        let (credentials, target) = match text.rsplit_once('@') {
            Some((credentials, target)) => (credentials, target),
            None => ("", text),
        };
        let (username, password) = credentials.split_once('/').unwrap_or((credentials, ""));
        let mut params = ConnectionParams::default();
        params.username = username.to_string();
        params.password = Password::new(password);
        params.connect_string = target.to_string();
        params.validate()?;
        Ok(params)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "user" | "username"      => self.username = value.to_string(),
            "password"               => self.password = Password::new(value),
            "newPassword"            => self.new_password = if value.is_empty() { None } else { Some(Password::new(value)) },
            "connectString"          => self.connect_string = value.to_string(),
            "connectionClass"        => self.conn_class = value.to_string(),
            "sysdba"                 => if parse_flag(key, value)? { self.auth_mode = AuthMode::SysDba },
            "sysoper"                => if parse_flag(key, value)? { self.auth_mode = AuthMode::SysOper },
            "prelim"                 => self.prelim = parse_flag(key, value)?,
            "standaloneConnection"   => self.standalone = parse_flag(key, value)?,
            "poolMinSessions"        => self.min_sessions = parse_num(key, value)?,
            "poolMaxSessions"        => self.max_sessions = parse_num(key, value)?,
            "poolIncrement"          => self.session_increment = parse_num(key, value)?,
            "poolWaitTimeout"        => self.wait_timeout = parse_duration(key, value)?,
            "poolSessionTimeout"     => self.session_timeout = parse_duration(key, value)?,
            "poolSessionMaxLifetime" => self.max_lifetime = parse_duration(key, value)?,
            "connectRetries"         => self.connect_retries = parse_num(key, value)?,
            "acquireAttempts"        => self.acquire_attempts = parse_num(key, value)?,
            "timezone"               => self.timezone = parse_timezone(value)?,
            "onInit"                 => {
                let (name, val) = value.split_once('=').ok_or_else(|| {
                    Error::Config(format!("onInit expects name=value, got {:?}", value))
                })?;
                self.on_init.push((name.trim().to_string(), val.trim().to_string()));
            }
            // recognized for compatibility, not used
            "configDir" | "libDir" | "enableEvents" | "heterogeneousPool" | "sysasm" | "noTimezoneCheck" => {}
            _ => return Err(Error::Config(format!("unknown parameter {:?}", key))),
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.connect_string.is_empty() && !self.prelim {
            return Err(Error::Config("connect string is empty".to_string()));
        }
        if self.max_sessions == 0 {
            return Err(Error::Config("maximum number of sessions must be positive".to_string()));
        }
        if self.min_sessions > self.max_sessions {
            return Err(Error::Config(format!("minimum number of sessions {} exceeds the maximum {}", self.min_sessions, self.max_sessions)));
        }
        if self.session_increment == 0 {
            return Err(Error::Config("session increment must be positive".to_string()));
        }
        Ok(())
    }

    /// Returns the textual form with the password in clear text
    pub fn string_with_password(&self) -> String {
        self.render(true)
    }

    fn render(&self, with_password: bool) -> String {
        let password = |pwd: &Password| if with_password { pwd.secret().to_string() } else { pwd.to_string() };
        let flag = |val: bool| if val { 1 } else { 0 };
        let mut text = format!(
            "user={:?} password={:?} connectString={:?}\n\
             connectionClass={:?} newPassword={:?}\n\
             poolIncrement={} poolMaxSessions={} poolMinSessions={} poolSessionMaxLifetime={}\n\
             poolSessionTimeout={} poolWaitTimeout={} prelim={} standaloneConnection={}\n\
             sysdba={} sysoper={} timezone={:?}\n\
             connectRetries={} acquireAttempts={}",
            self.username, password(&self.password), self.connect_string,
            self.conn_class, self.new_password.as_ref().map(password).unwrap_or_default(),
            self.session_increment, self.max_sessions, self.min_sessions, format_duration(self.max_lifetime),
            format_duration(self.session_timeout), format_duration(self.wait_timeout), flag(self.prelim), flag(self.standalone),
            flag(self.auth_mode == AuthMode::SysDba), flag(self.auth_mode == AuthMode::SysOper),
            self.timezone.map(|tz| tz.to_string()).unwrap_or_default(),
            self.connect_retries, self.acquire_attempts,
        );
        for (name, value) in &self.on_init {
            text.push_str(&format!("\nonInit={:?}", format!("{}={}", name, value)));
        }
        text
    }
}

/// Renders the parameters with the password redacted
impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

impl FromStr for ConnectionParams {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        ConnectionParams::parse(text)
    }
}

/// A builder to override default parameters and build [`ConnectionParams`]
#[derive(Debug, Clone)]
pub struct ConnectionParamsBuilder {
    params: ConnectionParams,
}

impl ConnectionParamsBuilder {
    pub fn username(mut self, username: &str) -> Self {
        self.params.username = username.to_string();
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.params.password = Password::new(password);
        self
    }

    /// Password that replaces the current (expired) one on connect
    pub fn new_password(mut self, password: &str) -> Self {
        self.params.new_password = Some(Password::new(password));
        self
    }

    pub fn connect_string(mut self, connect_string: &str) -> Self {
        self.params.connect_string = connect_string.to_string();
        self
    }

    /// Connection class that partitions the pooled sessions
    pub fn conn_class(mut self, conn_class: &str) -> Self {
        self.params.conn_class = conn_class.to_string();
        self
    }

    pub fn auth_mode(mut self, auth_mode: AuthMode) -> Self {
        self.params.auth_mode = auth_mode;
        self
    }

    pub fn prelim(mut self, prelim: bool) -> Self {
        self.params.prelim = prelim;
        self
    }

    pub fn min_sessions(mut self, min_sessions: usize) -> Self {
        self.params.min_sessions = min_sessions;
        self
    }

    pub fn max_sessions(mut self, max_sessions: usize) -> Self {
        self.params.max_sessions = max_sessions;
        self
    }

    pub fn session_increment(mut self, session_increment: usize) -> Self {
        self.params.session_increment = session_increment;
        self
    }

    pub fn wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.params.wait_timeout = wait_timeout;
        self
    }

    pub fn session_timeout(mut self, session_timeout: Duration) -> Self {
        self.params.session_timeout = session_timeout;
        self
    }

    pub fn max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.params.max_lifetime = max_lifetime;
        self
    }

    /// Disables pooling. Every request opens a new session that is closed when it is released.
    pub fn standalone(mut self, standalone: bool) -> Self {
        self.params.standalone = standalone;
        self
    }

    /// Adds a session parameter (`ALTER SESSION SET name = 'value'`) applied to every new or recycled session
    pub fn on_init(mut self, name: &str, value: &str) -> Self {
        self.params.on_init.push((name.to_string(), value.to_string()));
        self
    }

    pub fn timezone(mut self, timezone: FixedOffset) -> Self {
        self.params.timezone = Some(timezone);
        self
    }

    /// Number of attempts to open each of the minimum sessions when the pool is created
    pub fn connect_retries(mut self, connect_retries: usize) -> Self {
        self.params.connect_retries = connect_retries;
        self
    }

    /// Number of sessions `get_session` tries before it gives up on stale or failing sessions
    pub fn acquire_attempts(mut self, acquire_attempts: usize) -> Self {
        self.params.acquire_attempts = acquire_attempts.max(1);
        self
    }

    pub fn build(self) -> Result<ConnectionParams> {
        self.params.validate()?;
        Ok(self.params)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "false" | "FALSE" | "False" | "" => Ok(false),
        _ => Err(Error::Config(format!("{} expects 0 or 1, got {:?}", key, value))),
    }
}

fn parse_num(key: &str, value: &str) -> Result<usize> {
    value.parse().map_err(|_| Error::Config(format!("{} expects a number, got {:?}", key, value)))
}

/// Parses durations like `1h0m0s`, `5m`, `30s`, `250ms` or a plain number of seconds.
pub(crate) fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    let bad = || Error::Config(format!("{} expects a duration, got {:?}", key, value));
    if value.is_empty() {
        return Ok(Duration::ZERO);
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    let mut total = Duration::ZERO;
    let mut rest = value;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit() && c != '.').ok_or_else(bad)?;
        if digits == 0 {
            return Err(bad());
        }
        let amount : f64 = rest[..digits].parse().map_err(|_| bad())?;
        rest = &rest[digits..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "h"  => 3_600_000_000_000.0,
            "m"  => 60_000_000_000.0,
            "s"  => 1_000_000_000.0,
            "ms" => 1_000_000.0,
            "us" | "µs" => 1_000.0,
            _ => return Err(bad()),
        };
        let nanos = (amount * nanos_per_unit).round();
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return Err(bad());
        }
        total = total.checked_add(Duration::from_nanos(nanos as u64)).ok_or_else(bad)?;
        rest = &rest[unit_len..];
    }
    Ok(total)
}

fn format_duration(dur: Duration) -> String {
    let secs = dur.as_secs();
    let millis = dur.subsec_millis();
    if millis > 0 {
        return format!("{}ms", dur.as_millis());
    }
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else if m > 0 {
        format!("{}m{}s", m, s)
    } else {
        format!("{}s", s)
    }
}

fn parse_timezone(value: &str) -> Result<Option<FixedOffset>> {
    match value {
        "" | "local" => Ok(None),
        "UTC" | "utc" | "Z" => Ok(FixedOffset::east_opt(0)),
        _ => {
            let bad = || Error::Config(format!("timezone expects an offset like +02:00, got {:?}", value));
            let (sign, rest) = match value.as_bytes().first() {
                Some(b'+') => (1, &value[1..]),
                Some(b'-') => (-1, &value[1..]),
                _ => return Err(bad()),
            };
            let (h, m) = rest.split_once(':').unwrap_or((rest, "0"));
            let h : i32 = h.parse::<u8>().ok().filter(|&h| h < 24).ok_or_else(bad)?.into();
            let m : i32 = m.parse::<u8>().ok().filter(|&m| m < 60).ok_or_else(bad)?.into();
            FixedOffset::east_opt(sign * (h * 3600 + m * 60)).map(Some).ok_or_else(bad)
        }
    }
}

/// Splits `key=value key="quoted value"` text into pairs.
fn logfmt_pairs(text: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = text.chars().peekable();
    loop {
        while chars.peek().map_or(false, |c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }
        if chars.next() != Some('=') {
            return Err(Error::Config(format!("parameter {:?} has no value", key)));
        }
        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => if let Some(escaped) = chars.next() { value.push(escaped) },
                    '"'  => { closed = true; break; }
                    _    => value.push(c),
                }
            }
            if !closed {
                return Err(Error::Config(format!("unterminated quoted value of {:?}", key)));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }
        pairs.push((key, value));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn should_build_with_defaults() {
        let params = ConnectionParams::builder().connect_string("db/svc").build().unwrap();
        assert_eq!(params.min_sessions(), 1);
        assert_eq!(params.max_sessions(), 1000);
        assert_eq!(params.session_increment(), 1);
        assert_eq!(params.wait_timeout(), Duration::from_secs(30));
        assert_eq!(params.session_timeout(), Duration::from_secs(300));
        assert_eq!(params.max_lifetime(), Duration::from_secs(3600));
        assert!(!params.is_standalone());
        assert_eq!(params.conn_class(), "");
    }

    #[test]
    fn should_reject_invalid_sizing() {
        assert!(ConnectionParams::builder().build().is_err());
        assert!(ConnectionParams::builder().connect_string("db").max_sessions(0).build().is_err());
        assert!(ConnectionParams::builder().connect_string("db").min_sessions(3).max_sessions(2).build().is_err());
        assert!(ConnectionParams::builder().connect_string("db").session_increment(0).build().is_err());
        assert!(ConnectionParams::builder().prelim(true).build().is_ok());
    }

    #[test]
    fn should_parse_logfmt() {
        let params = ConnectionParams::parse(r#"user=system password=oracle connectString="(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST=db)(PORT=1521)))"
            configDir= connectionClass=POOLED enableEvents=0 heterogeneousPool=0 libDir=
            newPassword= poolIncrement=2 poolMaxSessions=10 poolMinSessions=0 poolSessionMaxLifetime=1h0m0s
            poolSessionTimeout=5m0s poolWaitTimeout=250ms prelim=0 standaloneConnection=1 sysasm=0
            sysdba=0 sysoper=0 timezone=+02:00 onInit="nls_numeric_characters=,.""#).unwrap();
        assert_eq!(params.username(), "system");
        assert_eq!(params.password().secret(), "oracle");
        assert_eq!(params.connect_string(), "(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST=db)(PORT=1521)))");
        assert_eq!(params.conn_class(), "POOLED");
        assert_eq!(params.new_password(), None);
        assert_eq!(params.session_increment(), 2);
        assert_eq!(params.max_sessions(), 10);
        assert_eq!(params.min_sessions(), 0);
        assert_eq!(params.max_lifetime(), Duration::from_secs(3600));
        assert_eq!(params.session_timeout(), Duration::from_secs(300));
        assert_eq!(params.wait_timeout(), Duration::from_millis(250));
        assert!(params.is_standalone());
        assert_eq!(params.timezone(), FixedOffset::east_opt(7200));
        assert_eq!(params.on_init(), &[("nls_numeric_characters".to_string(), ",.".to_string())]);
    }

    #[test]
    fn should_parse_easy_connect() {
        let params = ConnectionParams::parse("scott/tiger@localhost:1521/orclpdb").unwrap();
        assert_eq!(params.username(), "scott");
        assert_eq!(params.password().secret(), "tiger");
        assert_eq!(params.connect_string(), "localhost:1521/orclpdb");
    }

    #[test]
    fn should_reject_unknown_keys() {
        assert!(matches!(ConnectionParams::parse("user=a connectString=b color=red"), Err(Error::Config(_))));
        assert!(matches!(ConnectionParams::parse("user=a connectString=\"b"), Err(Error::Config(_))));
        assert!(matches!(ConnectionParams::parse("connectString=b poolMaxSessions=x"), Err(Error::Config(_))));
    }

    #[test]
    fn display_hides_password() {
        let params = ConnectionParams::builder()
            .username("scott").password("tiger").new_password("lion")
            .connect_string("db/svc")
            .on_init("time_zone", "+01:00")
            .build().unwrap();
        let text = params.to_string();
        assert!(!text.contains("tiger"));
        assert!(!text.contains("lion"));
        assert_eq!(format!("{:?}", params.password()), "\"SECRET\"");

        let parsed = ConnectionParams::parse(&params.string_with_password()).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn derived_params_are_copies() {
        let params = ConnectionParams::builder().username("scott").password("tiger").connect_string("db").build().unwrap();
        let sys = params.as_sysdba();
        assert_eq!(sys.auth_mode(), AuthMode::SysDba);
        assert!(sys.is_standalone());
        assert_eq!(params.auth_mode(), AuthMode::Default);
        let other = params.with_credentials("hr", "hr");
        assert_eq!(other.username(), "hr");
        assert_eq!(params.username(), "scott");
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("t", "1h2m3s").unwrap(), Duration::from_secs(3723));
        assert_eq!(parse_duration("t", "0s").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("t", "15").unwrap(), Duration::from_secs(15));
        assert!(parse_duration("t", "5x").is_err());
        assert!(parse_duration("t", "m").is_err());
        assert!(parse_duration("t", "99999999999h99999999999h").is_err());
        assert!(parse_duration("t", "18446744073709551616").is_err());
        assert_eq!(parse_duration("t", "1.5ms").unwrap(), Duration::from_micros(1500));
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h0m0s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m0s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
    }

    #[test]
    fn timezones() {
        assert_eq!(parse_timezone("").unwrap(), None);
        assert_eq!(parse_timezone("UTC").unwrap(), FixedOffset::east_opt(0));
        assert_eq!(parse_timezone("-05:30").unwrap(), FixedOffset::west_opt(5 * 3600 + 1800));
        assert_eq!(parse_timezone("+3").unwrap(), FixedOffset::east_opt(3 * 3600));
        assert!(parse_timezone("+999999:00").is_err());
        assert!(parse_timezone("+02:75").is_err());
        assert!(parse_timezone("+-2:00").is_err());
        assert!(parse_timezone("02:00").is_err());
    }
}
