//! Pure byte-at-a-time parser for the flex device's sample-set framing.
//! No I/O here — the driver feeds bytes in and reacts to `Emit`.

#[derive(Debug)]
enum State {
    WaitHeader,
    HeaderStart,
    ReadLengthMsb,
    ReadLengthLsb { msb: u8 },
    WaitBody { count: u16 },
    BodyStart { count: u16 },
    BodyPoint { count: u16, bytes_left: u8 },
    Unexpected,
}

const SAMPLE_LEN: u8 = 4;

/// Outcome of feeding one byte to the parser.
#[derive(Debug, PartialEq, Eq)]
pub enum Fed {
    /// Still accumulating; nothing to do.
    Pending,
    /// A full sample set was completed. Caller should publish the buffer and
    /// write `S\n` to request the next one.
    EmitSet(Vec<u8>),
}

/// Drives the WAIT_HEADER/HEADER_START/.../BODY_POINT state machine.
pub struct Parser {
    state: State,
    buffer: Vec<u8>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: State::WaitHeader,
            buffer: Vec::new(),
        }
    }

    /// Feed a single byte read from the serial port.
    pub fn feed(&mut self, byte: u8) -> Fed {
        let state = std::mem::replace(&mut self.state, State::Unexpected);
        let (next, fed) = match state {
            State::WaitHeader => {
                if byte == b'N' {
                    (State::HeaderStart, Fed::Pending)
                } else {
                    (State::WaitHeader, Fed::Pending)
                }
            }
            State::HeaderStart => {
                if byte == b'\n' {
                    (State::ReadLengthMsb, Fed::Pending)
                } else {
                    (State::Unexpected, Fed::Pending)
                }
            }
            State::ReadLengthMsb => (State::ReadLengthLsb { msb: byte }, Fed::Pending),
            State::ReadLengthLsb { msb } => {
                let count = u16::from_be_bytes([msb, byte]);
                (State::WaitBody { count }, Fed::Pending)
            }
            State::WaitBody { count } => {
                if byte == b'P' {
                    (State::BodyStart { count }, Fed::Pending)
                } else {
                    (State::Unexpected, Fed::Pending)
                }
            }
            State::BodyStart { count } => {
                if byte == b'\n' {
                    self.buffer.clear();
                    (State::BodyPoint { count, bytes_left: SAMPLE_LEN }, Fed::Pending)
                } else {
                    (State::Unexpected, Fed::Pending)
                }
            }
            State::BodyPoint { count, bytes_left } => {
                self.buffer.push(byte);
                let bytes_left = bytes_left - 1;
                if bytes_left == 0 {
                    let count = count - 1;
                    if count == 0 {
                        let emitted = std::mem::take(&mut self.buffer);
                        (State::WaitHeader, Fed::EmitSet(emitted))
                    } else {
                        (State::BodyPoint { count, bytes_left: SAMPLE_LEN }, Fed::Pending)
                    }
                } else {
                    (State::BodyPoint { count, bytes_left }, Fed::Pending)
                }
            }
            State::Unexpected => {
                if byte == b'N' {
                    self.buffer.clear();
                    (State::HeaderStart, Fed::Pending)
                } else {
                    (State::Unexpected, Fed::Pending)
                }
            }
        };
        self.state = next;
        fed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut Parser, bytes: &[u8]) -> Vec<Vec<u8>> {
        bytes
            .iter()
            .filter_map(|&b| match parser.feed(b) {
                Fed::EmitSet(set) => Some(set),
                Fed::Pending => None,
            })
            .collect()
    }

    #[test]
    fn scenario_two_samples_of_four_bytes_emit_one_set() {
        let mut parser = Parser::new();
        let mut frame = vec![b'N', b'\n', 0x00, 0x02, b'P', b'\n'];
        frame.extend_from_slice(&[0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18]);
        let emitted = feed_all(&mut parser, &frame);
        assert_eq!(emitted, vec![vec![0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18]]);
    }

    #[test]
    fn single_sample_set_emits_four_bytes() {
        let mut parser = Parser::new();
        let frame = [b'N', b'\n', 0x00, 0x01, b'P', b'\n', 0xAA, 0xBB, 0xCC, 0xDD];
        let emitted = feed_all(&mut parser, &frame);
        assert_eq!(emitted, vec![vec![0xAA, 0xBB, 0xCC, 0xDD]]);
    }

    #[test]
    fn emitted_buffer_length_is_always_a_multiple_of_four() {
        let mut parser = Parser::new();
        let mut frame = vec![b'N', b'\n', 0x00, 0x03, b'P', b'\n'];
        frame.extend((0u8..12).map(|i| i));
        let emitted = feed_all(&mut parser, &frame);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].len() % 4, 0);
        assert_eq!(emitted[0].len(), 12);
    }

    #[test]
    fn garbage_before_header_is_ignored() {
        let mut parser = Parser::new();
        let mut frame = vec![0xFF, 0xEE, b'N', b'\n', 0x00, 0x01, b'P', b'\n'];
        frame.extend_from_slice(&[1, 2, 3, 4]);
        let emitted = feed_all(&mut parser, &frame);
        assert_eq!(emitted, vec![vec![1, 2, 3, 4]]);
    }

    #[test]
    fn unexpected_byte_mid_frame_requires_a_fresh_header_to_recover() {
        let mut parser = Parser::new();
        // 'X' where 'P' was expected drops into Unexpected; only a later 'N'
        // resets the parser to collect a new frame.
        let mut frame = vec![b'N', b'\n', 0x00, 0x01, b'X'];
        frame.push(b'N');
        frame.extend_from_slice(&[b'\n', 0x00, 0x01, b'P', b'\n']);
        frame.extend_from_slice(&[9, 9, 9, 9]);
        let emitted = feed_all(&mut parser, &frame);
        assert_eq!(emitted, vec![vec![9, 9, 9, 9]]);
    }

    #[test]
    fn two_sample_sets_back_to_back_each_emit_once() {
        let mut parser = Parser::new();
        let mut frame = vec![b'N', b'\n', 0x00, 0x01, b'P', b'\n', 1, 2, 3, 4];
        frame.extend_from_slice(&[b'N', b'\n', 0x00, 0x01, b'P', b'\n', 5, 6, 7, 8]);
        let emitted = feed_all(&mut parser, &frame);
        assert_eq!(emitted, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
    }
}
