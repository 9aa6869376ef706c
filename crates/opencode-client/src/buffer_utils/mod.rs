mod buffering;
mod sse_parser;

pub use buffering::CircularLineBuffer;
pub use sse_parser::{
    parse_sse_stream, parse_sse_stream_with_limit, SseFrameDecoder, SseLineParser,
    DEFAULT_MAX_LINE_BYTES,
};
