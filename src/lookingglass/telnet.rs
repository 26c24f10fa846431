//! Telnet client for Cisco-style looking glasses such as route-views.
//!
//! The session is a plain NVT exchange: every option the server offers is
//! refused, so the server stays in line mode and does not echo input.
//!
//! # Session Flow
//!
//! 1. Connect (bounded by the per-operation timeout)
//! 2. Answer the `Username:` prompt, if any
//! 3. Learn the router prompt (e.g. `route-views>`)
//! 4. `terminal length 0` to disable paging
//! 5. `show ip bgp regexp _<ASN>_`, reading until the prompt returns
//!
//! The whole session is additionally bounded by the command timeout.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{route_query, LookingGlassFetcher};
use crate::error::FetchError;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

/// Telnet looking-glass client
pub struct TelnetLookingGlass {
    host: String,
    port: u16,
    username: String,
    timeout: Duration,
    command_timeout: Duration,
}

impl TelnetLookingGlass {
    /// Create a new telnet client.
    ///
    /// # Arguments
    ///
    /// * `host` - The looking glass hostname, e.g. `route-views.routeviews.org`
    /// * `port` - The telnet port (typically 23)
    /// * `username` - Login name, `rviews` for route-views
    /// * `timeout` - Connect, read and write timeout for each operation
    pub fn new(host: String, port: u16, username: String, timeout: Duration) -> Self {
        Self {
            host,
            port,
            username,
            timeout,
            command_timeout: timeout * 4,
        }
    }

    /// Bound the complete session, login included
    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn connect(&self) -> Result<TcpStream, FetchError> {
        let endpoint = self.endpoint();

        let addr = (&*self.host, self.port)
            .to_socket_addrs()
            .map_err(|e| FetchError::Unreachable {
                endpoint: endpoint.clone(),
                message: format!("unable to resolve host: {}", e),
            })?
            .next()
            .ok_or_else(|| FetchError::Unreachable {
                endpoint: endpoint.clone(),
                message: "no addresses found".to_string(),
            })?;

        let stream = TcpStream::connect_timeout(&addr, self.timeout).map_err(|e| match e.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::PermissionDenied => FetchError::Unreachable {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            },
            _ => FetchError::from_io(&endpoint, e),
        })?;

        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| FetchError::from_io(&endpoint, e))?;

        Ok(stream)
    }
}

impl LookingGlassFetcher for TelnetLookingGlass {
    fn fetch(&self, asn: u32) -> Result<String, FetchError> {
        let endpoint = self.endpoint();
        info!(
            "connecting to looking glass {} (timeout: {:?}, session limit: {:?})...",
            endpoint, self.timeout, self.command_timeout
        );

        let deadline = Instant::now() + self.command_timeout;
        let stream = self.connect()?;
        let mut session = TelnetSession::new(stream, endpoint.clone(), self.timeout, deadline);

        let greeting = session.read_until(|t| is_login_prompt(t) || prompt_of(t).is_some())?;
        let text = if is_login_prompt(&greeting) {
            session.send_line(&self.username)?;
            session.read_until(|t| login_failed(t) || prompt_of(t).is_some())?
        } else {
            greeting
        };

        if login_failed(&text) {
            return Err(FetchError::Session {
                endpoint,
                message: format!("login as {:?} was not accepted", self.username),
            });
        }
        let prompt = prompt_of(&text)
            .ok_or_else(|| FetchError::Session {
                endpoint: endpoint.clone(),
                message: "no router prompt after login".to_string(),
            })?
            .to_string();
        debug!("logged in, router prompt is {:?}", prompt);

        session.send_line("terminal length 0")?;
        session.read_until(|t| t.trim_end().ends_with(prompt.as_str()))?;

        let command = route_query(asn);
        info!("sending {:?}", command);
        session.send_line(&command)?;
        let output = session.read_until(|t| t.trim_end().ends_with(prompt.as_str()))?;

        // best effort, the output is already complete
        let _ = session.send_line("exit");

        let output = strip_command_output(&output, &command, &prompt);
        info!(
            "received {} bytes from looking glass {}",
            output.len(),
            endpoint
        );
        Ok(output)
    }

    fn source(&self) -> String {
        format!("telnet://{}", self.endpoint())
    }
}

struct TelnetSession {
    stream: TcpStream,
    endpoint: String,
    timeout: Duration,
    deadline: Instant,
    decoder: TelnetDecoder,
}

impl TelnetSession {
    fn new(stream: TcpStream, endpoint: String, timeout: Duration, deadline: Instant) -> Self {
        Self {
            stream,
            endpoint,
            timeout,
            deadline,
            decoder: TelnetDecoder::default(),
        }
    }

    /// Read until `done` holds for the text received so far, answering option
    /// negotiation on the way
    fn read_until<P: Fn(&str) -> bool>(&mut self, done: P) -> Result<String, FetchError> {
        let mut text = String::new();
        let mut chunk = [0u8; 4096];

        loop {
            if done(&text) {
                return Ok(text);
            }

            let now = Instant::now();
            if now >= self.deadline {
                return Err(FetchError::Timeout {
                    endpoint: self.endpoint.clone(),
                    message: "session time limit exceeded".to_string(),
                });
            }
            let wait = self.timeout.min(self.deadline - now);
            self.stream
                .set_read_timeout(Some(wait))
                .map_err(|e| FetchError::from_io(&self.endpoint, e))?;

            let n = self
                .stream
                .read(&mut chunk)
                .map_err(|e| FetchError::from_io(&self.endpoint, e))?;
            if n == 0 {
                return Err(FetchError::from_io(
                    &self.endpoint,
                    io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by looking glass",
                    ),
                ));
            }

            let decoded = self.decoder.feed(&chunk[..n]);
            if !decoded.replies.is_empty() {
                self.stream
                    .write_all(&decoded.replies)
                    .map_err(|e| FetchError::from_io(&self.endpoint, e))?;
            }
            text.push_str(&String::from_utf8_lossy(&decoded.data));
        }
    }

    fn send_line(&mut self, line: &str) -> Result<(), FetchError> {
        self.stream
            .write_all(format!("{}\r\n", line).as_bytes())
            .and_then(|_| self.stream.flush())
            .map_err(|e| FetchError::from_io(&self.endpoint, e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DecodeState {
    #[default]
    Data,
    Iac,
    Negotiate(u8),
    Sub,
    SubIac,
}

#[derive(Debug, Default)]
struct Decoded {
    data: Vec<u8>,
    replies: Vec<u8>,
}

/// Incremental telnet stream decoder; state survives chunk boundaries
#[derive(Debug, Default)]
struct TelnetDecoder {
    state: DecodeState,
}

impl TelnetDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Decoded {
        let mut out = Decoded::default();

        for &b in bytes {
            self.state = match (self.state, b) {
                (DecodeState::Data, IAC) => DecodeState::Iac,
                (DecodeState::Data, b'\r') | (DecodeState::Data, 0) => DecodeState::Data,
                (DecodeState::Data, b) => {
                    out.data.push(b);
                    DecodeState::Data
                }
                (DecodeState::Iac, IAC) => {
                    out.data.push(IAC);
                    DecodeState::Data
                }
                (DecodeState::Iac, DO | DONT | WILL | WONT) => DecodeState::Negotiate(b),
                (DecodeState::Iac, SB) => DecodeState::Sub,
                (DecodeState::Iac, _) => DecodeState::Data,
                (DecodeState::Negotiate(cmd), option) => {
                    match cmd {
                        DO => out.replies.extend_from_slice(&[IAC, WONT, option]),
                        WILL => out.replies.extend_from_slice(&[IAC, DONT, option]),
                        _ => {}
                    }
                    DecodeState::Data
                }
                (DecodeState::Sub, IAC) => DecodeState::SubIac,
                (DecodeState::Sub, _) => DecodeState::Sub,
                (DecodeState::SubIac, SE) => DecodeState::Data,
                (DecodeState::SubIac, _) => DecodeState::Sub,
            };
        }

        out
    }
}

fn last_line(text: &str) -> &str {
    text.rsplit('\n').next().unwrap_or(text).trim()
}

fn is_login_prompt(text: &str) -> bool {
    let line = last_line(text).to_lowercase();
    line.ends_with("username:") || line.ends_with("login:")
}

fn login_failed(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("login invalid")
        || lower.contains("authentication failed")
        || last_line(text).to_lowercase().ends_with("password:")
}

/// Router prompt on the last line, e.g. `route-views>`
fn prompt_of(text: &str) -> Option<&str> {
    let line = last_line(text);
    let is_prompt = line.len() > 1
        && line.len() <= 64
        && (line.ends_with('>') || line.ends_with('#'))
        && !line.contains(char::is_whitespace);
    is_prompt.then_some(line)
}

/// Drop the echoed command and the trailing prompt from a command's output
fn strip_command_output(output: &str, command: &str, prompt: &str) -> String {
    let body = output.trim_end();
    let body = body.strip_suffix(prompt).unwrap_or(body);

    let mut lines = body.lines().skip_while(|l| l.trim().is_empty()).peekable();
    if lines
        .peek()
        .map(|l| l.trim_end().ends_with(command))
        .unwrap_or(false)
    {
        lines.next();
    }

    let mut result = lines.collect::<Vec<&str>>().join("\n");
    let trimmed_len = result.trim_end().len();
    result.truncate(trimmed_len);
    if !result.is_empty() {
        result.push('\n');
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    const ROUTES: &str = "BGP table version is 1095245, local router ID is 128.223.51.103\r\n\
Status codes: s suppressed, d damped, h history, * valid, > best, i - internal,\r\n\
Origin codes: i - IGP, e - EGP, ? - incomplete\r\n\
\r\n\
     Network          Next Hop            Metric LocPrf Weight Path\r\n\
 *   192.0.2.0/24     64.71.137.241                          0 6939 64500 i\r\n\
 *>                   4.68.4.46                0             0 3356 64500 i\r\n";

    #[test]
    fn test_decoder_refuses_options() {
        let mut decoder = TelnetDecoder::default();
        let decoded = decoder.feed(&[IAC, DO, 31, b'h', b'i', IAC, WILL, 1, b'\r', b'\n']);
        assert_eq!(decoded.data, b"hi\n");
        assert_eq!(decoded.replies, vec![IAC, WONT, 31, IAC, DONT, 1]);
    }

    #[test]
    fn test_decoder_across_chunks() {
        let mut decoder = TelnetDecoder::default();
        let first = decoder.feed(&[b'a', IAC]);
        let second = decoder.feed(&[DO, 24, b'b']);
        assert_eq!(first.data, b"a");
        assert!(first.replies.is_empty());
        assert_eq!(second.data, b"b");
        assert_eq!(second.replies, vec![IAC, WONT, 24]);
    }

    #[test]
    fn test_decoder_skips_subnegotiation_and_unescapes() {
        let mut decoder = TelnetDecoder::default();
        let decoded = decoder.feed(&[IAC, SB, 24, 1, IAC, SE, b'x', IAC, IAC]);
        assert_eq!(decoded.data, vec![b'x', IAC]);
        assert!(decoded.replies.is_empty());
    }

    #[test]
    fn test_prompt_detection() {
        assert_eq!(prompt_of("banner\nroute-views>"), Some("route-views>"));
        assert_eq!(prompt_of("banner\nrouter# "), Some("router#"));
        assert_eq!(prompt_of("Username: "), None);
        assert_eq!(prompt_of("some text > more"), None);
        assert!(is_login_prompt("Hello\n\nUsername: "));
        assert!(login_failed("\n% Login invalid\n\nUsername: "));
    }

    #[test]
    fn test_strip_command_output() {
        let output = "show ip bgp regexp _64500_\n line one\n line two\n\nroute-views>";
        assert_eq!(
            strip_command_output(output, "show ip bgp regexp _64500_", "route-views>"),
            " line one\n line two\n"
        );
        assert_eq!(
            strip_command_output("\nroute-views>", "show ip bgp regexp _64500_", "route-views>"),
            ""
        );
    }

    #[test]
    fn test_fetch_from_loopback_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(sock.try_clone().unwrap());
            let mut received = Vec::new();

            sock.write_all(&[IAC, DO, 31]).unwrap();
            sock.write_all(b"\r\nroute-views test server\r\n\r\nUsername: ")
                .unwrap();

            for response in [
                b"\r\nroute-views>".to_vec(),
                b"\r\nroute-views>".to_vec(),
                format!("show ip bgp regexp _64500_\r\n{}\r\nroute-views>", ROUTES).into_bytes(),
            ] {
                let mut line = Vec::new();
                reader.read_until(b'\n', &mut line).unwrap();
                received.push(line);
                sock.write_all(&response).unwrap();
            }

            let mut exit = Vec::new();
            let _ = reader.read_until(b'\n', &mut exit);
            received
        });

        let client = TelnetLookingGlass::new(
            "127.0.0.1".to_string(),
            port,
            "rviews".to_string(),
            Duration::from_secs(5),
        );
        let output = client.fetch(64500).unwrap();
        let received = server.join().unwrap();

        assert!(received[0].starts_with(&[IAC, WONT, 31]));
        assert!(received[0].ends_with(b"rviews\r\n"));
        assert_eq!(received[1], b"terminal length 0\r\n");
        assert_eq!(received[2], b"show ip bgp regexp _64500_\r\n");

        assert!(output.starts_with("BGP table version"));
        assert!(output.contains("6939 64500 i"));
        assert!(!output.contains("route-views>"));
        assert!(!output.contains('\r'));
        assert_eq!(client.source(), format!("telnet://127.0.0.1:{}", port));
    }

    #[test]
    fn test_fetch_times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let server = thread::spawn(move || {
            let (_sock, _) = listener.accept().unwrap();
            let _ = done_rx.recv();
        });

        let client = TelnetLookingGlass::new(
            "127.0.0.1".to_string(),
            port,
            "rviews".to_string(),
            Duration::from_millis(200),
        );
        let err = client.fetch(64500).unwrap_err();
        done_tx.send(()).unwrap();
        server.join().unwrap();

        assert!(matches!(err, FetchError::Timeout { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_refused_connection_is_not_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = TelnetLookingGlass::new(
            "127.0.0.1".to_string(),
            port,
            "rviews".to_string(),
            Duration::from_secs(1),
        );
        let err = client.fetch(64500).unwrap_err();
        assert!(matches!(err, FetchError::Unreachable { .. }));
        assert!(!err.is_transient());
    }
}
