//! MPEG-1 video decoder.
//!
//! State hierarchy per ISO/IEC 11172-2: sequence, group of pictures,
//! picture, slice, macroblock, block. Reference frames live in three fixed
//! slots rotated by index; B-pictures reorder emission so frames come out
//! in display order. All error handling is non-throwing: malformed headers
//! drop the picture and resync at the next start code, corrupt macroblocks
//! are abandoned silently.

use tracing::{debug, warn};

use kino_core::{BitBuffer, Frame};

use crate::idct::{add_block, add_value, copy_block, copy_value, idct};
use crate::motion::{apply_motion_code, process_block, Motion};
use crate::tables;
use crate::{
    is_slice_start_code, EXTENSION_START_CODE, PICTURE_START_CODE, PICTURE_TYPE_B,
    PICTURE_TYPE_INTRA, PICTURE_TYPE_PREDICTIVE, SEQUENCE_HEADER_CODE, USER_DATA_START_CODE,
};

/// MPEG-1 video decoder over a bit buffer.
///
/// The [`Frame`] returned by [`VideoDecoder::decode`] is owned by the
/// decoder and overwritten by a later call; clone it to retain it.
pub struct VideoDecoder {
    buffer: BitBuffer,

    time: f64,
    frames_decoded: usize,

    width: usize,
    height: usize,
    mb_width: usize,
    mb_height: usize,
    mb_size: usize,
    luma_width: usize,
    chroma_width: usize,
    framerate: f64,

    has_sequence_header: bool,
    has_reference_frame: bool,
    assume_no_b_frames: bool,
    start_code: Option<u8>,

    picture_type: u8,
    quantizer_scale: u32,
    slice_begin: bool,
    macroblock_address: i32,
    mb_row: usize,
    mb_col: usize,
    macroblock_intra: bool,

    motion_forward: Motion,
    motion_backward: Motion,
    dc_predictor: [i32; 3],

    intra_quant_matrix: [u8; 64],
    non_intra_quant_matrix: [u8; 64],
    block_data: [i32; 64],

    frames: [Frame; 3],
    current: usize,
    forward: usize,
    backward: usize,
    last_emitted: Option<usize>,
}

impl VideoDecoder {
    /// Create a decoder over a buffer carrying an MPEG-1 video elementary
    /// stream.
    pub fn new(buffer: BitBuffer) -> Self {
        Self {
            buffer,
            time: 0.0,
            frames_decoded: 0,
            width: 0,
            height: 0,
            mb_width: 0,
            mb_height: 0,
            mb_size: 0,
            luma_width: 0,
            chroma_width: 0,
            framerate: 0.0,
            has_sequence_header: false,
            has_reference_frame: false,
            assume_no_b_frames: false,
            start_code: None,
            picture_type: 0,
            quantizer_scale: 1,
            slice_begin: false,
            macroblock_address: 0,
            mb_row: 0,
            mb_col: 0,
            macroblock_intra: false,
            motion_forward: Motion::default(),
            motion_backward: Motion::default(),
            dc_predictor: [128; 3],
            intra_quant_matrix: tables::INTRA_QUANT_MATRIX,
            non_intra_quant_matrix: tables::NON_INTRA_QUANT_MATRIX,
            block_data: [0; 64],
            frames: [Frame::new(0, 0), Frame::new(0, 0), Frame::new(0, 0)],
            current: 0,
            forward: 1,
            backward: 2,
            last_emitted: None,
        }
    }

    /// Access the source buffer.
    pub fn buffer(&self) -> &BitBuffer {
        &self.buffer
    }

    /// Mutable access to the source buffer, e.g. to feed it more bytes.
    pub fn buffer_mut(&mut self) -> &mut BitBuffer {
        &mut self.buffer
    }

    /// Whether a sequence header has been parsed; tries to parse one from
    /// the bytes available now.
    pub fn has_header(&mut self) -> bool {
        if self.has_sequence_header {
            return true;
        }

        if self.start_code != Some(SEQUENCE_HEADER_CODE)
            && !self.buffer.find_start_code(SEQUENCE_HEADER_CODE)
        {
            return false;
        }
        self.start_code = Some(SEQUENCE_HEADER_CODE);

        self.decode_sequence_header()
    }

    /// Display width in pixels (0 before the sequence header).
    pub fn width(&mut self) -> usize {
        self.has_header();
        self.width
    }

    /// Display height in pixels (0 before the sequence header).
    pub fn height(&mut self) -> usize {
        self.has_header();
        self.height
    }

    /// Frame rate in frames per second (0 before the sequence header).
    pub fn framerate(&mut self) -> f64 {
        self.has_header();
        self.framerate
    }

    /// Presentation time of the next frame, in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Re-anchor the clock, e.g. after a demuxer seek.
    pub fn set_time(&mut self, time: f64) {
        self.frames_decoded = (time * self.framerate) as usize;
        self.time = time;
    }

    /// Whether low-latency mode is on.
    pub fn no_delay(&self) -> bool {
        self.assume_no_b_frames
    }

    /// Assume the stream has no B-pictures and emit every picture
    /// immediately. One frame less latency, garbage output if B-pictures do
    /// occur.
    pub fn set_no_delay(&mut self, no_delay: bool) {
        self.assume_no_b_frames = no_delay;
    }

    /// Whether the source ended and no further frame is recoverable.
    pub fn has_ended(&self) -> bool {
        self.buffer.has_ended()
    }

    /// Restart decoding from the beginning of the source.
    pub fn rewind(&mut self) {
        self.buffer.rewind();
        self.time = 0.0;
        self.frames_decoded = 0;
        self.has_reference_frame = false;
        self.start_code = None;
        self.last_emitted = None;
    }

    /// The most recently decoded frame, valid until the next
    /// [`VideoDecoder::decode`] call.
    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_emitted.map(|slot| &self.frames[slot])
    }

    /// Decode and return the next frame in display order, or `None` if more
    /// bytes are needed or the stream ended.
    pub fn decode(&mut self) -> Option<&Frame> {
        if !self.has_header() {
            return None;
        }

        let emit_slot = loop {
            if self.start_code != Some(PICTURE_START_CODE) {
                if self.buffer.find_start_code(PICTURE_START_CODE) {
                    self.start_code = Some(PICTURE_START_CODE);
                } else {
                    self.start_code = None;
                    // The source is exhausted; flush the outstanding
                    // reference frame, which a later B-picture could no
                    // longer depend on.
                    if self.has_reference_frame
                        && !self.assume_no_b_frames
                        && self.buffer.has_ended()
                    {
                        self.has_reference_frame = false;
                        break self.backward;
                    }
                    return None;
                }
            }

            // Only decode once the whole picture is buffered, which can
            // only be detected by finding the start of the next one (or
            // the end of the source).
            if !self.buffer.has_start_code(PICTURE_START_CODE) && !self.buffer.has_ended() {
                return None;
            }

            if !self.decode_picture() {
                // Unsupported or broken picture; resync at the next one.
                self.start_code = None;
                continue;
            }

            if self.assume_no_b_frames {
                break self.backward;
            } else if self.picture_type == PICTURE_TYPE_B {
                break self.current;
            } else if self.has_reference_frame {
                break self.forward;
            }
            self.has_reference_frame = true;
        };

        let time = self.time;
        self.frames_decoded += 1;
        self.time = self.frames_decoded as f64 / self.framerate;

        self.frames[emit_slot].time = time;
        self.last_emitted = Some(emit_slot);
        Some(&self.frames[emit_slot])
    }

    fn decode_sequence_header(&mut self) -> bool {
        // Worst case: fixed fields plus two custom quantizer matrices.
        let max_header_size = 64 + 2 * 64 * 8;
        if !self.buffer.has(max_header_size) {
            return false;
        }

        self.width = self.buffer.read(12) as usize;
        self.height = self.buffer.read(12) as usize;
        if self.width == 0 || self.height == 0 {
            warn!(
                width = self.width,
                height = self.height,
                "rejecting empty sequence geometry"
            );
            return false;
        }

        self.buffer.skip(4); // pixel aspect ratio
        self.framerate = tables::PICTURE_RATE[self.buffer.read(4) as usize];
        self.buffer.skip(18 + 1 + 10 + 1); // bit rate, marker, vbv size, constrained flag

        // Custom quantizer matrices arrive in zig-zag order.
        if self.buffer.read(1) != 0 {
            for i in 0..64 {
                self.intra_quant_matrix[tables::ZIG_ZAG[i]] = self.buffer.read(8) as u8;
            }
        } else {
            self.intra_quant_matrix = tables::INTRA_QUANT_MATRIX;
        }
        if self.buffer.read(1) != 0 {
            for i in 0..64 {
                self.non_intra_quant_matrix[tables::ZIG_ZAG[i]] = self.buffer.read(8) as u8;
            }
        } else {
            self.non_intra_quant_matrix = tables::NON_INTRA_QUANT_MATRIX;
        }

        self.mb_width = (self.width + 15) >> 4;
        self.mb_height = (self.height + 15) >> 4;
        self.mb_size = self.mb_width * self.mb_height;
        self.luma_width = self.mb_width << 4;
        self.chroma_width = self.mb_width << 3;

        for frame in &mut self.frames {
            *frame = Frame::new(self.width, self.height);
        }

        self.has_sequence_header = true;
        debug!(
            width = self.width,
            height = self.height,
            framerate = self.framerate,
            "sequence header parsed"
        );
        true
    }

    /// Decode one picture. Returns `false` for picture types this decoder
    /// drops (D pictures, reserved types, zero f_codes).
    fn decode_picture(&mut self) -> bool {
        self.buffer.skip(10); // temporal reference
        self.picture_type = self.buffer.read(3) as u8;
        self.buffer.skip(16); // vbv delay

        if self.picture_type == 0 || self.picture_type > PICTURE_TYPE_B {
            warn!(
                picture_type = self.picture_type,
                "dropping unsupported picture type"
            );
            return false;
        }

        if self.picture_type == PICTURE_TYPE_PREDICTIVE || self.picture_type == PICTURE_TYPE_B {
            self.motion_forward.full_pel = self.buffer.read(1) != 0;
            let f_code = self.buffer.read(3);
            if f_code == 0 {
                return false;
            }
            self.motion_forward.r_size = f_code - 1;
        }
        if self.picture_type == PICTURE_TYPE_B {
            self.motion_backward.full_pel = self.buffer.read(1) != 0;
            let f_code = self.buffer.read(3);
            if f_code == 0 {
                return false;
            }
            self.motion_backward.r_size = f_code - 1;
        }

        let is_reference = self.picture_type == PICTURE_TYPE_INTRA
            || self.picture_type == PICTURE_TYPE_PREDICTIVE;

        let frame_temp = self.forward;
        if is_reference {
            self.forward = self.backward;
        }

        // Skip extension and user data, then decode slices.
        loop {
            self.start_code = self.buffer.next_start_code();
            if self.start_code != Some(EXTENSION_START_CODE)
                && self.start_code != Some(USER_DATA_START_CODE)
            {
                break;
            }
        }

        while let Some(code) = self.start_code {
            if !is_slice_start_code(code) {
                break;
            }
            self.decode_slice(code as usize);
            if self.macroblock_address >= self.mb_size as i32 - 2 {
                break;
            }
            self.start_code = self.buffer.next_start_code();
        }

        if is_reference {
            self.backward = self.current;
            self.current = frame_temp;
        }
        true
    }

    fn decode_slice(&mut self, slice: usize) {
        self.slice_begin = true;
        self.macroblock_address = (slice as i32 - 1) * self.mb_width as i32 - 1;

        // Reset motion vectors and DC predictors.
        self.motion_forward.reset_vector();
        self.motion_backward.reset_vector();
        self.dc_predictor = [128; 3];

        self.quantizer_scale = self.buffer.read(5);

        // Skip extra slice information.
        while self.buffer.read(1) != 0 {
            self.buffer.skip(8);
        }

        loop {
            self.decode_macroblock();
            if self.macroblock_address >= self.mb_size as i32 - 1
                || !self.buffer.peek_non_zero(23)
            {
                break;
            }
        }
    }

    fn decode_macroblock(&mut self) {
        // Address increment, folding escapes and skipping stuffing.
        let mut increment = 0i32;
        let mut t = self.buffer.read_vlc(&tables::MACROBLOCK_ADDRESS_INCREMENT);
        while t == 34 {
            // macroblock_stuffing
            t = self.buffer.read_vlc(&tables::MACROBLOCK_ADDRESS_INCREMENT);
        }
        while t == 35 {
            // macroblock_escape
            increment += 33;
            t = self.buffer.read_vlc(&tables::MACROBLOCK_ADDRESS_INCREMENT);
        }
        increment += t as i32;

        if self.slice_begin {
            // The first increment of a slice is relative to the previous
            // row; there are no in-between macroblocks to predict.
            self.slice_begin = false;
            self.macroblock_address += increment;
        } else {
            if self.macroblock_address + increment >= self.mb_size as i32 {
                return; // invalid
            }
            if increment > 1 {
                // Skipped macroblocks reset DC predictors.
                self.dc_predictor = [128; 3];
                // Skipped macroblocks in P-pictures reset motion vectors.
                if self.picture_type == PICTURE_TYPE_PREDICTIVE {
                    self.motion_forward.reset_vector();
                }
            }

            // Predict skipped macroblocks from the reference picture.
            while increment > 1 {
                self.macroblock_address += 1;
                self.mb_row = self.macroblock_address as usize / self.mb_width;
                self.mb_col = self.macroblock_address as usize % self.mb_width;
                self.predict_macroblock();
                increment -= 1;
            }
            self.macroblock_address += 1;
        }

        self.mb_row = self.macroblock_address as usize / self.mb_width;
        self.mb_col = self.macroblock_address as usize % self.mb_width;
        if self.mb_col >= self.mb_width || self.mb_row >= self.mb_height {
            return; // corrupt stream
        }

        let table = match self.picture_type {
            PICTURE_TYPE_INTRA => &tables::MACROBLOCK_TYPE_INTRA[..],
            PICTURE_TYPE_PREDICTIVE => &tables::MACROBLOCK_TYPE_PREDICTIVE[..],
            _ => &tables::MACROBLOCK_TYPE_B[..],
        };
        let macroblock_type = self.buffer.read_vlc(table);

        self.macroblock_intra = macroblock_type & 0x01 != 0;
        self.motion_forward.is_set = macroblock_type & 0x08 != 0;
        self.motion_backward.is_set = macroblock_type & 0x04 != 0;

        if macroblock_type & 0x10 != 0 {
            self.quantizer_scale = self.buffer.read(5);
        }

        if self.macroblock_intra {
            // Intra-coded macroblocks reset motion vectors.
            self.motion_forward.reset_vector();
            self.motion_backward.reset_vector();
        } else {
            // Non-intra macroblocks reset DC predictors.
            self.dc_predictor = [128; 3];
            self.decode_motion_vectors();
            self.predict_macroblock();
        }

        let cbp = if macroblock_type & 0x02 != 0 {
            self.buffer.read_vlc(&tables::CODE_BLOCK_PATTERN) as u32
        } else if self.macroblock_intra {
            0x3F
        } else {
            0
        };

        for block in 0..6 {
            if cbp & (0x20 >> block) != 0 {
                self.decode_block(block);
            }
        }
    }

    fn decode_motion_vectors(&mut self) {
        if self.motion_forward.is_set {
            let r_size = self.motion_forward.r_size;
            self.motion_forward.h = self.decode_motion_vector(r_size, self.motion_forward.h);
            self.motion_forward.v = self.decode_motion_vector(r_size, self.motion_forward.v);
        } else if self.picture_type == PICTURE_TYPE_PREDICTIVE {
            // No motion information in a P-picture: reset vectors.
            self.motion_forward.reset_vector();
        }

        if self.motion_backward.is_set {
            let r_size = self.motion_backward.r_size;
            self.motion_backward.h = self.decode_motion_vector(r_size, self.motion_backward.h);
            self.motion_backward.v = self.decode_motion_vector(r_size, self.motion_backward.v);
        }
    }

    fn decode_motion_vector(&mut self, r_size: u32, motion: i32) -> i32 {
        let code = self.buffer.read_vlc(&tables::MOTION) as i32;
        let residual = if code != 0 && r_size != 0 {
            self.buffer.read(r_size)
        } else {
            0
        };
        apply_motion_code(motion, r_size, code, residual)
    }

    fn predict_macroblock(&mut self) {
        let mut fw_h = self.motion_forward.h;
        let mut fw_v = self.motion_forward.v;
        if self.motion_forward.full_pel {
            fw_h <<= 1;
            fw_v <<= 1;
        }

        if self.picture_type == PICTURE_TYPE_B {
            let mut bw_h = self.motion_backward.h;
            let mut bw_v = self.motion_backward.v;
            if self.motion_backward.full_pel {
                bw_h <<= 1;
                bw_v <<= 1;
            }

            if self.motion_forward.is_set {
                self.copy_macroblock(self.forward, fw_h, fw_v, false);
                if self.motion_backward.is_set {
                    self.copy_macroblock(self.backward, bw_h, bw_v, true);
                }
            } else {
                self.copy_macroblock(self.backward, bw_h, bw_v, false);
            }
        } else {
            self.copy_macroblock(self.forward, fw_h, fw_v, false);
        }
    }

    fn copy_macroblock(&mut self, source_slot: usize, motion_h: i32, motion_v: i32, interpolate: bool) {
        let (src, dst) = two_frames(&mut self.frames, source_slot, self.current);
        process_block(
            src.y.data(),
            dst.y.data_mut(),
            self.luma_width,
            self.mb_row,
            self.mb_col,
            motion_h,
            motion_v,
            16,
            interpolate,
        );
        process_block(
            src.cr.data(),
            dst.cr.data_mut(),
            self.chroma_width,
            self.mb_row,
            self.mb_col,
            motion_h / 2,
            motion_v / 2,
            8,
            interpolate,
        );
        process_block(
            src.cb.data(),
            dst.cb.data_mut(),
            self.chroma_width,
            self.mb_row,
            self.mb_col,
            motion_h / 2,
            motion_v / 2,
            8,
            interpolate,
        );
    }

    fn decode_block(&mut self, block: usize) {
        let mut n = 0usize;

        let quant_matrix = if self.macroblock_intra {
            // DC coefficient: size code, differential, ISO sign extension.
            let plane_index = if block > 3 { block - 3 } else { 0 };
            let predictor = self.dc_predictor[plane_index];
            let dct_size = if plane_index == 0 {
                self.buffer.read_vlc(&tables::DCT_DC_SIZE_LUMINANCE)
            } else {
                self.buffer.read_vlc(&tables::DCT_DC_SIZE_CHROMINANCE)
            } as u32;

            let dc = if dct_size > 0 {
                let differential = self.buffer.read(dct_size) as i32;
                if differential & (1 << (dct_size - 1)) != 0 {
                    predictor + differential
                } else {
                    predictor + ((-1i32 << dct_size) | (differential + 1))
                }
            } else {
                predictor
            };
            self.dc_predictor[plane_index] = dc;

            // 3 bits from 8-bit to 11-bit range, 5 bits of premultiplier.
            self.block_data[0] = dc << (3 + 5);
            n = 1;
            self.intra_quant_matrix
        } else {
            self.non_intra_quant_matrix
        };

        // AC coefficients (and the DC coefficient for non-intra blocks).
        loop {
            let coeff = self.buffer.read_vlc_uint(&tables::DCT_COEFF);
            if coeff == 0x0001 && n > 0 && self.buffer.read(1) == 0 {
                break; // end_of_block
            }

            let run;
            let mut level;
            if coeff == 0xFFFF {
                // escape: explicit 6-bit run and 8-bit level
                run = self.buffer.read(6) as usize;
                level = self.buffer.read(8) as i32;
                if level == 0 {
                    level = self.buffer.read(8) as i32;
                } else if level == 128 {
                    level = self.buffer.read(8) as i32 - 256;
                } else if level > 128 {
                    level -= 256;
                }
            } else {
                run = (coeff >> 8) as usize;
                level = (coeff & 0xFF) as i32;
                if self.buffer.read(1) != 0 {
                    level = -level;
                }
            }

            n += run;
            if n >= 64 {
                return; // invalid; abandon the macroblock
            }
            let de_zig_zagged = tables::ZIG_ZAG[n];
            n += 1;

            // Dequantize, oddify, clip.
            level <<= 1;
            if !self.macroblock_intra {
                level += if level < 0 { -1 } else { 1 };
            }
            level = (level * self.quantizer_scale as i32 * quant_matrix[de_zig_zagged] as i32) >> 4;
            if level & 1 == 0 {
                level -= if level > 0 { 1 } else { -1 };
            }
            level = level.clamp(-2048, 2047);

            self.block_data[de_zig_zagged] = level * tables::PREMULTIPLIER_MATRIX[de_zig_zagged];
        }

        // Place the block into the current frame.
        let (stride, index, plane) = if block < 4 {
            let mut index = (self.mb_row * self.luma_width + self.mb_col) << 4;
            if block & 1 != 0 {
                index += 8;
            }
            if block & 2 != 0 {
                index += self.luma_width << 3;
            }
            (self.luma_width, index, 0)
        } else {
            let index = ((self.mb_row * self.luma_width) << 2) + (self.mb_col << 3);
            (self.chroma_width, index, if block == 4 { 1 } else { 2 })
        };

        let frame = &mut self.frames[self.current];
        let dest = match plane {
            0 => frame.y.data_mut(),
            1 => frame.cb.data_mut(),
            _ => frame.cr.data_mut(),
        };

        if n == 1 {
            // DC-only block: a constant sample, no transform needed.
            let value = (self.block_data[0] + 128) >> 8;
            if self.macroblock_intra {
                copy_value(value.clamp(0, 255) as u8, dest, index, stride);
            } else {
                add_value(value, dest, index, stride);
            }
            self.block_data[0] = 0;
        } else {
            idct(&mut self.block_data);
            if self.macroblock_intra {
                copy_block(&self.block_data, dest, index, stride);
            } else {
                add_block(&self.block_data, dest, index, stride);
            }
            self.block_data = [0; 64];
        }
    }
}

impl std::fmt::Debug for VideoDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoDecoder")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("framerate", &self.framerate)
            .field("time", &self.time)
            .field("has_sequence_header", &self.has_sequence_header)
            .field("no_delay", &self.assume_no_b_frames)
            .finish_non_exhaustive()
    }
}

/// Disjoint source and destination frame slots.
fn two_frames(frames: &mut [Frame; 3], src: usize, dst: usize) -> (&Frame, &mut Frame) {
    debug_assert_ne!(src, dst);
    if src < dst {
        let (left, right) = frames.split_at_mut(dst);
        (&left[src], &mut right[0])
    } else {
        let (left, right) = frames.split_at_mut(src);
        (&right[0], &mut left[dst])
    }
}
