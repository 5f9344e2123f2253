//! RFC 1662 async-HDLC-like framing used on the serial line: flag delimiting,
//! byte stuffing, and the 16-bit FCS (Appendix C).

use thiserror::Error;

pub const FLAG: u8 = 0x7E;
pub const ESCAPE: u8 = 0x7D;
const ESCAPE_XOR: u8 = 0x20;
const ADDRESS: u8 = 0xFF;
const CONTROL: u8 = 0x03;

pub const INITIAL_FCS: u16 = 0xFFFF;
/// FCS of a complete, valid frame (address|control|payload|fcs_lo|fcs_hi).
pub const GOOD_FCS: u16 = 0xF0B8;

const fn build_fcs_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;

    while i < 256 {
        let mut b = i as u16;
        let mut round = 0;

        while round < 8 {
            b = if b & 1 != 0 { (b >> 1) ^ 0x8408 } else { b >> 1 };
            round += 1;
        }

        table[i] = b;
        i += 1;
    }

    table
}

static FCS_TABLE: [u16; 256] = build_fcs_table();

pub fn fcs_update(fcs: u16, byte: u8) -> u16 {
    (fcs >> 8) ^ FCS_TABLE[((fcs ^ byte as u16) & 0xff) as usize]
}

fn needs_stuffing(b: u8) -> bool {
    b == FLAG || b == ESCAPE
}

/// Worst-case number of wire bytes [`frame_into`] can produce for a payload
/// of `payload_len` bytes: every payload/address/control/FCS byte stuffed,
/// plus the two flags.
pub fn worst_case_len(payload_len: usize) -> usize {
    2 * (payload_len + 4) + 2
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramerError {
    #[error("output buffer too small (have {available} bytes)")]
    BufferTooSmall { available: usize },
}

struct Writer<'a> {
    out: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn push(&mut self, b: u8) -> Result<(), FramerError> {
        let slot = self
            .out
            .get_mut(self.pos)
            .ok_or(FramerError::BufferTooSmall { available: self.out.len() })?;

        *slot = b;
        self.pos += 1;
        Ok(())
    }

    fn push_stuffed(&mut self, b: u8) -> Result<(), FramerError> {
        if needs_stuffing(b) {
            self.push(ESCAPE)?;
            self.push(b ^ ESCAPE_XOR)
        } else {
            self.push(b)
        }
    }
}

/// Frames `payload` as an HDLC frame (flag, address/control, stuffed
/// payload, stuffed FCS, flag) into `out`, returning the number of bytes
/// written. `out` should be sized per [`worst_case_len`].
pub fn frame_into(payload: &[u8], out: &mut [u8]) -> Result<usize, FramerError> {
    let mut w = Writer { out, pos: 0 };
    let mut fcs = INITIAL_FCS;

    w.push(FLAG)?;

    for &b in &[ADDRESS, CONTROL] {
        fcs = fcs_update(fcs, b);
        w.push_stuffed(b)?;
    }

    for &b in payload {
        fcs = fcs_update(fcs, b);
        w.push_stuffed(b)?;
    }

    let tx_fcs = fcs ^ 0xffff;

    for &b in &tx_fcs.to_le_bytes() {
        w.push_stuffed(b)?;
    }

    w.push(FLAG)?;

    Ok(w.pos)
}

/// Incremental receiver: reconstructs HDLC frames from byte slices handed to
/// it across arbitrary read boundaries, verifies the FCS, and invokes a
/// caller-supplied sink once per complete, valid frame with the PPP payload
/// (address/control prefix and trailing FCS stripped).
///
/// The sink is supplied per call rather than stored at construction: storing
/// it here would require `Deframer` to hold a handle back into whatever owns
/// the serial [`crate::session::Service`] that owns this `Deframer`, which is
/// exactly the cyclic-ownership shape the design explicitly avoids. Driving
/// the event loop from the top (the access concentrator reads the serial fd,
/// feeds this deframer, and forwards whatever payloads come back) keeps
/// ownership one-directional.
pub struct Deframer {
    in_frame: bool,
    in_escape: bool,
    hdlc_header_checked: u8,
    fcs: u16,
    buf: Vec<u8>,
    capacity: usize,
}

impl Deframer {
    pub fn new(capacity: usize) -> Self {
        Self {
            in_frame: false,
            in_escape: false,
            hdlc_header_checked: 0,
            fcs: INITIAL_FCS,
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    fn start_new_frame(&mut self) {
        self.in_frame = true;
        self.in_escape = false;
        self.hdlc_header_checked = 0;
        self.fcs = INITIAL_FCS;
        self.buf.clear();
    }

    fn abandon_frame(&mut self) {
        self.in_frame = false;
        self.in_escape = false;
    }

    /// Feeds a single byte through the state machine, invoking `on_frame`
    /// with the PPP payload whenever `b` completes a valid frame.
    pub fn push_byte(&mut self, b: u8, on_frame: &mut dyn FnMut(&[u8])) {
        if !self.in_frame {
            if b == FLAG {
                self.start_new_frame();
            }
            return;
        }

        if self.in_escape {
            if b == FLAG {
                tracing::debug!("HDLC: escape immediately before flag, discarding frame");
                self.abandon_frame();
            } else {
                self.in_escape = false;
                self.process_body_byte(b ^ ESCAPE_XOR, on_frame);
            }
            return;
        }

        match b {
            FLAG => {
                let frame_size = self.buf.len();

                if frame_size >= 4 {
                    if self.fcs == GOOD_FCS {
                        on_frame(&self.buf[..frame_size - 2]);
                    } else {
                        tracing::debug!("HDLC: FCS mismatch, discarding frame");
                    }
                }
                // frame_size in [0, 4) is an empty or too-short inter-frame
                // gap; ignored without comment either way.
                self.start_new_frame();
            }
            ESCAPE => {
                self.in_escape = true;
            }
            other => self.process_body_byte(other, on_frame),
        }
    }

    fn process_body_byte(&mut self, b: u8, on_frame: &mut dyn FnMut(&[u8])) {
        self.fcs = fcs_update(self.fcs, b);

        if self.hdlc_header_checked < 2 {
            let expected = [ADDRESS, CONTROL][self.hdlc_header_checked as usize];

            if b != expected {
                tracing::debug!("HDLC: unexpected address/control prefix, abandoning frame");
                self.abandon_frame();
                return;
            }

            self.hdlc_header_checked += 1;
            return;
        }

        if self.buf.len() >= self.capacity {
            tracing::debug!("HDLC: output buffer full, abandoning frame");
            self.abandon_frame();
            return;
        }

        self.buf.push(b);
        let _ = on_frame; // frame completion is only signalled on a flag byte
    }

    /// Feeds an arbitrary byte slice, in order, through [`Self::push_byte`].
    pub fn feed(&mut self, bytes: &[u8], on_frame: &mut dyn FnMut(&[u8])) {
        for &b in bytes {
            self.push_byte(b, on_frame);
        }
    }
}
