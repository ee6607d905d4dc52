// src/exec/output.rs

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

use crate::logsink::{self, Level, LogSink};
use crate::types::ScriptId;

/// Forward every non-empty line of `stream` to the sink until end-of-stream.
///
/// Bytes are decoded as UTF-8 with invalid sequences replaced; trailing
/// whitespace is stripped. Returns the number of lines forwarded.
pub async fn pump_lines<R>(
    stream: Option<R>,
    sink: &dyn LogSink,
    script_id: ScriptId,
    script_name: &str,
    level: Level,
) -> usize
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return 0;
    };

    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut forwarded = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let text = text.trim_end();
                if !text.is_empty() {
                    logsink::emit(sink, script_id, script_name, level, text).await;
                    forwarded += 1;
                }
            }
            Err(e) => {
                debug!(script_id, level = level.as_str(), error = %e, "output stream read failed");
                break;
            }
        }
    }

    forwarded
}
