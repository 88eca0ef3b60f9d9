pub mod accumulator;

use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::relay::accumulator::{PendingInvocation, ToolCallAccumulator};
use crate::session::{Role, Turn};
use crate::state::AppState;
use crate::stream::{encode_event, FrameDecoder, OutgoingEvent, StreamChunk};

/// Outgoing channel depth. The bounded channel plus hyper's body flushing is
/// what applies backpressure to the pump when the client reads slowly.
pub(crate) const OUTGOING_CHANNEL_CAPACITY: usize = 32;

/// The client side of the stream has gone away; the pump must stop reading
/// upstream and release the connection.
pub(crate) struct WriterClosed;

/// Owns the single client-facing output stream for one request.
///
/// Events are framed and sent in the order they are produced, never
/// reordered or buffered beyond the channel; `final_answer` deltas are also
/// assembled here so the full text can be appended to the session once.
pub(crate) struct EventWriter {
    tx: mpsc::Sender<Bytes>,
    answer: String,
}

impl EventWriter {
    pub(crate) fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            tx,
            answer: String::new(),
        }
    }

    pub(crate) async fn emit(&mut self, event: &OutgoingEvent) -> Result<(), WriterClosed> {
        if let OutgoingEvent::FinalAnswer(delta) = event {
            self.answer.push_str(delta);
        }
        self.tx
            .send(encode_event(event))
            .await
            .map_err(|_| WriterClosed)
    }

    pub(crate) fn into_answer(self) -> String {
        self.answer
    }
}

/// Drive one request's stream: upstream bytes in, client-facing events out.
///
/// The loop suspends at exactly two points — the next upstream chunk (bounded
/// by the idle-read timeout) and tool execution. Everything between is
/// synchronous, so accumulator state needs no locking. Returns the assembled
/// assistant text, which is also appended to the session as a single turn.
pub async fn run_pump<S, E>(
    byte_stream: S,
    state: &AppState,
    session_id: &str,
    tx: mpsc::Sender<Bytes>,
    idle_timeout: Duration,
) -> String
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut writer = EventWriter::new(tx);
    let mut decoder = FrameDecoder::new();
    let mut accumulator = ToolCallAccumulator::new();
    let mut frames: Vec<StreamChunk> = Vec::with_capacity(8);
    let mut stream = std::pin::pin!(byte_stream);

    'pump: loop {
        let chunk = match tokio::time::timeout(idle_timeout, stream.next()).await {
            Err(_elapsed) => {
                tracing::warn!(session_id, "upstream stalled past idle-read timeout");
                let _ = writer
                    .emit(&OutgoingEvent::Error("上游响应超时".to_string()))
                    .await;
                break 'pump;
            }
            Ok(None) => break 'pump,
            Ok(Some(Err(err))) => {
                tracing::warn!(session_id, error = %err, "upstream read failed");
                let _ = writer
                    .emit(&OutgoingEvent::Error(format!("上游读取失败: {err}")))
                    .await;
                break 'pump;
            }
            Ok(Some(Ok(bytes))) => bytes,
        };

        frames.clear();
        decoder.feed_into(&chunk, &mut frames);
        for frame in frames.drain(..) {
            if process_frame(frame, &mut accumulator, &mut writer, state, session_id)
                .await
                .is_err()
            {
                tracing::debug!(session_id, "client disconnected, releasing upstream");
                break 'pump;
            }
        }
    }

    let answer = writer.into_answer();
    state
        .sessions
        .append(session_id, Turn::new(Role::Assistant, answer.clone()));
    answer
}

async fn process_frame(
    frame: StreamChunk,
    accumulator: &mut ToolCallAccumulator,
    writer: &mut EventWriter,
    state: &AppState,
    session_id: &str,
) -> Result<(), WriterClosed> {
    for choice in frame.choices {
        if let Some(deltas) = &choice.delta.tool_calls {
            accumulator.absorb(deltas);
        }

        let finished_with_tool_calls = choice.finished_with_tool_calls();

        // Plain content bypasses the accumulator entirely and may interleave
        // with tool-call frames.
        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                writer.emit(&OutgoingEvent::FinalAnswer(content)).await?;
            }
        }

        if finished_with_tool_calls {
            if let Some(batch) = accumulator.take_batch() {
                execute_batch(batch, writer, state, session_id).await?;
                accumulator.finish_batch();
            }
        }
    }
    Ok(())
}

/// Execute one drained batch in fragment-index order.
///
/// Argument-parse failures and executor-level failures both degrade to a
/// `tool_call_error` event plus a `tool` turn; only a dead client stops the
/// stream.
async fn execute_batch(
    batch: Vec<PendingInvocation>,
    writer: &mut EventWriter,
    state: &AppState,
    session_id: &str,
) -> Result<(), WriterClosed> {
    for invocation in batch {
        let args: serde_json::Value = match serde_json::from_str(&invocation.arguments) {
            Ok(args) => args,
            Err(err) => {
                let error = format!("工具参数解析失败: {err}");
                tracing::warn!(session_id, tool = %invocation.name, %error, "dropping invocation");
                state
                    .sessions
                    .append(session_id, Turn::new(Role::Tool, error.clone()));
                writer.emit(&OutgoingEvent::ToolCallError { error }).await?;
                continue;
            }
        };

        writer
            .emit(&OutgoingEvent::ToolCallStart {
                tool: invocation.name.clone(),
                args: args.clone(),
            })
            .await?;

        match state.tools.execute(&invocation.name, &args).await {
            Ok(value) => {
                let result = value.to_string();
                state
                    .sessions
                    .append(session_id, Turn::new(Role::Tool, result.clone()));
                writer
                    .emit(&OutgoingEvent::ToolCallResult {
                        tool: invocation.name,
                        result,
                    })
                    .await?;
            }
            Err(error) => {
                state
                    .sessions
                    .append(session_id, Turn::new(Role::Tool, error.clone()));
                writer.emit(&OutgoingEvent::ToolCallError { error }).await?;
            }
        }
    }
    Ok(())
}
