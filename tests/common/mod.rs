#![allow(dead_code)]

pub mod test_server {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Once;
    use std::thread;
    use std::time::Duration;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    /// Latency of `?kind=slow`
    pub const SLOW_DELAY: Duration = Duration::from_millis(50);

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x10000);
        });
    }

    /// Local HTTP server with three behaviours selected by the `kind` query parameter:
    ///
    /// - `kind=slow`: 200 `slow` after [`SLOW_DELAY`]
    /// - `kind=fast`: 200 `fast` immediately
    /// - anything else: 503 with an empty body
    pub struct MockServer {
        port: u16,
    }

    impl MockServer {
        pub fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();

            thread::spawn(move || {
                for stream in listener.incoming() {
                    match stream {
                        Ok(stream) => {
                            thread::spawn(move || handle_connection(stream));
                        }
                        Err(_) => break,
                    }
                }
            });

            Self { port }
        }

        pub fn url(&self, kind: &str) -> String {
            format!("http://127.0.0.1:{}/?kind={}", self.port, kind)
        }
    }

    fn handle_connection(mut stream: TcpStream) {
        let mut buf = [0u8; 4096];
        let mut read = 0;
        while read < buf.len() {
            match stream.read(&mut buf[read..]) {
                Ok(0) | Err(_) => return,
                Ok(n) => read += n,
            }
            if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }

        let head = String::from_utf8_lossy(&buf[..read]);
        let target = head
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or("/");

        let (status, body) = if target.contains("kind=slow") {
            thread::sleep(SLOW_DELAY);
            ("200 OK", "slow")
        } else if target.contains("kind=fast") {
            ("200 OK", "fast")
        } else {
            ("503 Service Unavailable", "")
        };

        let resp = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let _ = stream.write_all(resp.as_bytes());
        let _ = stream.flush();
    }
}

pub mod transports {
    use bulkhttp::{Body, Request, Response, TransportError};
    use http::{HeaderMap, StatusCode};
    use std::io::{self, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Sleep on the coroutine in small steps, failing fast once the request's scope ends
    pub fn scoped_sleep(request: &Request, total: Duration) -> Result<(), TransportError> {
        let step = Duration::from_millis(1);
        let mut slept = Duration::ZERO;
        while slept < total {
            if let Some(reason) = request.scope().err() {
                return Err(TransportError::scope(request, reason));
            }
            may::coroutine::sleep(step);
            slept += step;
        }
        Ok(())
    }

    /// Response whose body is the request's URL
    pub fn echo_url(request: &Request) -> Response {
        Response::new(
            StatusCode::OK,
            HeaderMap::new(),
            Body::from_bytes(request.target()),
        )
    }

    /// Reader that counts how many times a body was released
    pub struct TrackedReader {
        data: io::Cursor<Vec<u8>>,
        releases: Arc<AtomicUsize>,
    }

    impl TrackedReader {
        pub fn new(data: impl Into<Vec<u8>>, releases: Arc<AtomicUsize>) -> Self {
            Self {
                data: io::Cursor::new(data.into()),
                releases,
            }
        }
    }

    impl Read for TrackedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.data.read(buf)
        }
    }

    impl Drop for TrackedReader {
        fn drop(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}
