//! Line-based input source.
//!
//! Stands in for a game controller: each line of text is one poll, and
//! `;` separates several events on the same line.
//!
//! ```text
//! Axis 0 value: -12000
//! Button 3 pressed; Button 3 released
//! ```
//!
//! Lines are read on a detached OS thread and handed over through a
//! channel. A read that never returns (stdin with nobody typing) then
//! cannot hold up runtime shutdown.

use std::io::{BufRead, BufReader, Read};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use framelink_core::{ControlEvent, InputSource};

pub struct LineInput {
    lines: mpsc::UnboundedReceiver<String>,
}

impl LineInput {
    pub fn stdin() -> Self {
        Self::blocking(std::io::stdin())
    }

    /// Read lines from `reader` on a dedicated thread.
    pub fn blocking<R: Read + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let spawned = std::thread::Builder::new()
            .name("framelink-input".into())
            .spawn(move || {
                for line in BufReader::new(reader).lines() {
                    match line {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("input read failed: {e}");
                            break;
                        }
                    }
                }
                debug!("input reader finished");
            });
        if let Err(e) = spawned {
            // The sender was dropped with the closure, so `poll` ends at once.
            warn!("could not start input reader: {e}");
        }
        Self { lines: rx }
    }
}

/// Parse one line into events. Blank segments are skipped.
pub fn parse_line(line: &str) -> Vec<ControlEvent> {
    line.split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(ControlEvent::parse)
        .collect()
}

#[async_trait]
impl InputSource for LineInput {
    async fn poll(&mut self) -> Option<Vec<ControlEvent>> {
        let line = self.lines.recv().await?;
        Some(parse_line(&line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::{Duration, Instant};

    /// A reader that blocks until bytes are pushed or the pusher is dropped.
    struct Gate(std_mpsc::Receiver<Vec<u8>>);

    impl Read for Gate {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.recv() {
                Ok(bytes) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Err(_) => Ok(0),
            }
        }
    }

    #[test]
    fn splits_and_parses() {
        assert_eq!(
            parse_line("Button 3 pressed; Button 3 released;"),
            vec![ControlEvent::ButtonPressed(3), ControlEvent::ButtonReleased(3)]
        );
        assert!(parse_line("   ").is_empty());
    }

    #[tokio::test]
    async fn polls_line_by_line_until_eof() {
        let text: &'static [u8] = b"Axis 1 value: 42\n\nwave\n";
        let mut input = LineInput::blocking(text);

        assert_eq!(
            input.poll().await,
            Some(vec![ControlEvent::Axis { axis: 1, value: 42 }])
        );
        assert_eq!(input.poll().await, Some(vec![]));
        assert_eq!(
            input.poll().await,
            Some(vec![ControlEvent::Other("wave".into())])
        );
        assert_eq!(input.poll().await, None);
    }

    #[test]
    fn stalled_reader_does_not_block_runtime_shutdown() {
        let (push, gate) = std_mpsc::channel();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();

        let mut input = LineInput::blocking(Gate(gate));
        runtime.block_on(async {
            push.send(b"Button 1 pressed\n".to_vec()).unwrap();
            assert_eq!(input.poll().await, Some(vec![ControlEvent::ButtonPressed(1)]));
            // Nothing more is typed; the reader thread stays blocked.
            let idle = tokio::time::timeout(Duration::from_millis(50), input.poll()).await;
            assert!(idle.is_err());
        });

        let started = Instant::now();
        drop(runtime);
        assert!(started.elapsed() < Duration::from_secs(1));

        drop(push);
    }
}
