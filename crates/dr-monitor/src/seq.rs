use dr_proto::SequenceHeader;
use dr_ring::Span;

/// Per-sequence bookkeeping every diagnostic stage needs to turn a raw
/// gulp span into a normalized gulp: the header decoded once at
/// `first_of_sequence`, and the running `time_tag` advanced by `navg`
/// every gulp regardless of whether this gulp's cadence gate fires (spec
/// §4.5 "Advance `time_tag` per gulp regardless of emission").
#[derive(Debug, Default)]
pub struct SeqState {
    pub header: Option<SequenceHeader>,
    pub time_tag: i64,
}

impl SeqState {
    /// Updates tracking state from a newly-observed span and returns the
    /// header in effect for it.
    pub fn observe<T>(&mut self, span: &Span<T>) -> Result<SequenceHeader, serde_json::Error> {
        if span.first_of_sequence {
            let header = SequenceHeader::from_json(&span.header)?;
            self.time_tag = header.time_tag;
            self.header = Some(header);
        }
        Ok(self.header.expect("header decoded on first_of_sequence before any span is observed"))
    }

    pub fn advance(&mut self, navg: i32) {
        self.time_tag += i64::from(navg);
    }
}
