//! MPEG-PS demultiplexer.
//!
//! The demuxer is a small state machine over its source buffer: parse one
//! pack header and one system header, then repeatedly scan for PES start
//! codes and decode the claimed ones (video, audio 0..=3, private stream 1).
//! Packet payloads are returned as views into the source buffer and stay
//! valid until the next pull.

use tracing::{debug, warn};

use kino_core::{clock_to_seconds, BitBuffer, INVALID_TS};

use crate::packet::{is_audio_id, Packet};
use crate::{PACK_HEADER_CODE, STREAM_PRIVATE_1, STREAM_VIDEO_1, SYSTEM_HEADER_CODE};

/// A parsed PES header whose payload may not be fully buffered yet.
#[derive(Debug, Clone, Copy, Default)]
struct PendingPacket {
    stream_id: u8,
    length: usize,
    pts: f64,
}

/// MPEG Program Stream demuxer.
pub struct Demuxer {
    buffer: BitBuffer,

    system_clock_ref: f64,
    has_pack_header: bool,
    has_system_header: bool,
    has_headers: bool,
    num_audio_streams: usize,
    num_video_streams: usize,

    /// Pending start code whose packet header was not yet decodable.
    start_code: Option<u8>,
    /// Parsed header waiting for its payload bytes.
    next_packet: PendingPacket,
    /// Length of the packet most recently handed out, still to be skipped.
    current_length: usize,

    last_decoded_pts: f64,
    start_time: f64,
    duration: f64,
    last_file_size: usize,
}

impl Demuxer {
    /// Create a demuxer over a source buffer and probe for headers if
    /// enough bytes are already available.
    pub fn new(buffer: BitBuffer) -> Self {
        let mut demuxer = Self {
            buffer,
            system_clock_ref: 0.0,
            has_pack_header: false,
            has_system_header: false,
            has_headers: false,
            num_audio_streams: 0,
            num_video_streams: 0,
            start_code: None,
            next_packet: PendingPacket::default(),
            current_length: 0,
            last_decoded_pts: INVALID_TS,
            start_time: INVALID_TS,
            duration: INVALID_TS,
            last_file_size: 0,
        };
        demuxer.has_headers();
        demuxer
    }

    /// Access the source buffer.
    pub fn buffer(&self) -> &BitBuffer {
        &self.buffer
    }

    /// Mutable access to the source buffer, e.g. to feed it more bytes.
    pub fn buffer_mut(&mut self) -> &mut BitBuffer {
        &mut self.buffer
    }

    /// Whether pack and system headers have been parsed. Tries to parse
    /// them from the bytes available now.
    pub fn has_headers(&mut self) -> bool {
        if self.has_headers {
            return true;
        }

        if !self.has_pack_header {
            if self.start_code != Some(PACK_HEADER_CODE)
                && !self.buffer.find_start_code(PACK_HEADER_CODE)
            {
                return false;
            }
            self.start_code = Some(PACK_HEADER_CODE);
            if !self.buffer.has(64) {
                return false;
            }
            self.start_code = None;

            if self.buffer.read(4) != 0x02 {
                warn!("pack header version is not MPEG-1");
                return false;
            }
            self.system_clock_ref = self.decode_time();
            self.buffer.skip(1);
            self.buffer.skip(22); // mux_rate * 50
            self.buffer.skip(1);
            self.has_pack_header = true;
            debug!(scr = self.system_clock_ref, "pack header parsed");
        }

        if !self.has_system_header {
            if self.start_code != Some(SYSTEM_HEADER_CODE)
                && !self.buffer.find_start_code(SYSTEM_HEADER_CODE)
            {
                return false;
            }
            self.start_code = Some(SYSTEM_HEADER_CODE);
            if !self.buffer.has(56) {
                return false;
            }
            self.start_code = None;

            self.buffer.skip(16); // header length
            self.buffer.skip(24); // rate bound + markers
            self.num_audio_streams = self.buffer.read(6) as usize;
            self.buffer.skip(5); // misc flags
            self.num_video_streams = self.buffer.read(5) as usize;
            self.has_system_header = true;
            debug!(
                audio = self.num_audio_streams,
                video = self.num_video_streams,
                "system header parsed"
            );
        }

        self.has_headers = true;
        true
    }

    /// Number of audio streams announced by the system header.
    pub fn num_audio_streams(&mut self) -> usize {
        self.has_headers();
        self.num_audio_streams
    }

    /// Number of video streams announced by the system header.
    pub fn num_video_streams(&mut self) -> usize {
        self.has_headers();
        self.num_video_streams
    }

    /// Whether the source ended and no further packet is recoverable.
    pub fn has_ended(&self) -> bool {
        self.buffer.has_ended()
    }

    /// Restart demuxing from the beginning of the source.
    pub fn rewind(&mut self) {
        self.buffer.rewind();
        self.current_length = 0;
        self.next_packet.length = 0;
        self.start_code = None;
    }

    /// Pull the next claimed PES packet, or `None` if more bytes are needed
    /// (or the source ended). The previously returned packet's payload is
    /// skipped first.
    pub fn decode(&mut self) -> Option<Packet<'_>> {
        if !self.has_headers() {
            return None;
        }

        // Skip the payload handed out on the previous pull.
        if self.current_length > 0 {
            let bits_till_next_packet = self.current_length << 3;
            if !self.buffer.has(bits_till_next_packet) {
                return None;
            }
            self.buffer.skip(bits_till_next_packet);
            self.current_length = 0;
        }

        // Pending packet waiting for payload bytes?
        if self.next_packet.length > 0 {
            return self.get_packet();
        }

        // Pending packet waiting for its header?
        if let Some(code) = self.start_code {
            return self.decode_packet(code);
        }

        loop {
            match self.buffer.next_start_code() {
                Some(code) => {
                    self.start_code = Some(code);
                    if code == STREAM_VIDEO_1 || code == STREAM_PRIVATE_1 || is_audio_id(code) {
                        return self.decode_packet(code);
                    }
                }
                None => {
                    self.start_code = None;
                    return None;
                }
            }
        }
    }

    /// First valid PTS of the given stream. Rewinds, scans, and restores the
    /// read position. Cached once found.
    pub fn get_start_time(&mut self, stream_id: u8) -> f64 {
        if self.start_time != INVALID_TS {
            return self.start_time;
        }

        let previous_pos = self.buffer.tell();
        let previous_start_code = self.start_code;

        self.rewind();
        loop {
            let (found, done) = match self.decode() {
                None => (INVALID_TS, true),
                Some(packet) if packet.stream_id == stream_id => (packet.pts, false),
                Some(_) => (INVALID_TS, false),
            };
            if found != INVALID_TS {
                self.start_time = found;
            }
            if done || self.start_time != INVALID_TS {
                break;
            }
        }

        self.current_length = 0;
        self.next_packet.length = 0;
        self.buffer.seek(previous_pos);
        self.start_code = previous_start_code;
        self.start_time
    }

    /// Duration of the given stream in seconds: last PTS minus start time.
    ///
    /// Scans a window at the end of the file, doubling it from 64 KiB up to
    /// 4 MiB until a timestamped packet turns up. Cached against file size.
    pub fn get_duration(&mut self, stream_id: u8) -> f64 {
        let file_size = self.buffer.size();
        if self.duration != INVALID_TS && self.last_file_size == file_size {
            return self.duration;
        }

        let previous_pos = self.buffer.tell();
        let previous_start_code = self.start_code;

        const START_RANGE: usize = 64 * 1024;
        const MAX_RANGE: usize = 4096 * 1024;
        let mut range = START_RANGE;
        while range <= MAX_RANGE {
            let seek_pos = file_size.saturating_sub(range);
            if seek_pos == 0 {
                range = MAX_RANGE; // whole file covered; bail after this round
            }
            self.buffer.seek(seek_pos);
            self.current_length = 0;
            self.next_packet.length = 0;
            self.start_code = None;

            let mut last_pts = INVALID_TS;
            loop {
                let pts = match self.decode() {
                    None => break,
                    Some(packet) if packet.stream_id == stream_id => packet.pts,
                    Some(_) => INVALID_TS,
                };
                if pts != INVALID_TS {
                    last_pts = pts;
                }
            }
            if last_pts != INVALID_TS {
                self.duration = last_pts - self.get_start_time(stream_id);
                break;
            }
            range *= 2;
        }

        self.last_file_size = file_size;
        self.current_length = 0;
        self.next_packet.length = 0;
        self.buffer.seek(previous_pos);
        self.start_code = previous_start_code;
        self.duration
    }

    /// Binary-probe seek: land on the last packet of `stream_id` at or
    /// before `seek_time`. With `force_intra`, only packets whose payload
    /// starts an intra-coded picture qualify.
    ///
    /// Returns the located packet, re-decoded at its final position.
    pub fn seek(&mut self, seek_time: f64, stream_id: u8, force_intra: bool) -> Option<Packet<'_>> {
        if !self.has_headers() {
            return None;
        }

        let duration = self.get_duration(stream_id);
        if duration <= 0.0 {
            return None;
        }
        let file_size = self.buffer.size();
        let mut byterate = file_size as f64 / duration;

        let mut cur_time = self.last_decoded_pts;
        let mut scan_span = 1.0;

        let mut seek_time = seek_time.clamp(0.0, duration);
        seek_time += self.get_start_time(stream_id);

        self.current_length = 0;
        self.next_packet.length = 0;
        self.start_code = None;

        for _retry in 0..32 {
            // Assigned here but never set true below; the final fallback
            // branch therefore always runs when nothing else matched.
            let found_packet_with_pts = false;
            let mut found_packet_in_range = false;
            let mut last_valid_packet_start: Option<usize> = None;
            let mut first_packet_time = INVALID_TS;

            let cur_pos = self.buffer.tell();

            // Estimate the byte offset of packets shortly before seek_time
            // and jump there.
            let offset = (seek_time - cur_time - scan_span) * byterate;
            let seek_pos = ((cur_pos as f64 + offset).max(0.0) as usize)
                .min(file_size.saturating_sub(256));
            debug!(seek_pos, cur_time, byterate, "seek probe");
            self.buffer.seek(seek_pos);

            // Scan packets up to seek_time, remembering the last qualifying
            // packet start.
            while self.buffer.find_start_code(stream_id) {
                let packet_start = self.buffer.tell();
                let (pts, qualifies) = {
                    match self.decode_packet(stream_id) {
                        None => continue,
                        Some(packet) => {
                            let qualifies = if force_intra {
                                payload_starts_intra_picture(packet.payload())
                            } else {
                                true
                            };
                            (packet.pts, qualifies)
                        }
                    }
                };

                // Packets without a PTS cannot anchor the search.
                if pts == INVALID_TS {
                    continue;
                }

                // Outside the scan window: adjust the estimates so the next
                // jump is more precise, and bail out of this scan.
                if pts > seek_time || pts < seek_time - scan_span {
                    byterate = (seek_pos as f64 - cur_pos as f64) / (pts - cur_time);
                    cur_time = pts;
                    break;
                }

                if !found_packet_in_range {
                    found_packet_in_range = true;
                    first_packet_time = pts;
                }

                if qualifies {
                    last_valid_packet_start = Some(packet_start);
                }
            }

            // Found a qualifying packet in range: jump back and re-decode it.
            if let Some(packet_start) = last_valid_packet_start {
                self.buffer.seek(packet_start);
                self.current_length = 0;
                self.next_packet.length = 0;
                return self.decode_packet(stream_id);
            }

            // Packets were in range but none qualified (no intra frame):
            // widen the window and avoid rescanning the same stretch.
            if found_packet_in_range {
                scan_span *= 2.0;
                seek_time = first_packet_time;
            }
            // No packet with a PTS at all: probably past the end. Re-anchor
            // the estimates at the stream end.
            else if !found_packet_with_pts {
                byterate = (seek_pos as f64 - cur_pos as f64) / (duration - cur_time);
                cur_time = duration;
            }
        }

        warn!(seek_time, "seek gave up after 32 probes");
        None
    }

    /// Decode the PES packet header following its start code, then hand out
    /// the payload once fully buffered.
    fn decode_packet(&mut self, stream_id: u8) -> Option<Packet<'_>> {
        if !self.buffer.has(16 << 3) {
            return None;
        }
        self.start_code = None;

        let mut length = self.buffer.read(16) as i64;
        length -= self.buffer.skip_bytes(0xFF) as i64; // stuffing

        // P-STD buffer scale and size.
        if self.buffer.read(2) == 0x01 {
            self.buffer.skip(16);
            length -= 2;
        }

        let pts = match self.buffer.read(2) {
            0x03 => {
                // PTS and DTS; only the PTS is kept.
                let pts = self.decode_time();
                self.last_decoded_pts = pts;
                self.buffer.skip(40);
                length -= 10;
                pts
            }
            0x02 => {
                let pts = self.decode_time();
                self.last_decoded_pts = pts;
                length -= 5;
                pts
            }
            0x00 => {
                self.buffer.skip(4);
                length -= 1;
                INVALID_TS
            }
            marker => {
                warn!(marker, "invalid PTS/DTS marker; dropping packet");
                return None;
            }
        };

        self.next_packet = PendingPacket {
            stream_id,
            length: length.max(0) as usize,
            pts,
        };
        self.get_packet()
    }

    /// Materialize the pending packet if its payload is fully buffered.
    fn get_packet(&mut self) -> Option<Packet<'_>> {
        if !self.buffer.has(self.next_packet.length << 3) {
            return None;
        }

        let PendingPacket {
            stream_id,
            length,
            pts,
        } = self.next_packet;
        self.next_packet.length = 0;
        self.current_length = length;

        let offset = self.buffer.bit_position() >> 3;
        Some(Packet::new(
            stream_id,
            pts,
            &self.buffer.data()[offset..offset + length],
        ))
    }

    /// Decode a 33-bit 90 kHz clock value: three 3/15/15-bit groups, each
    /// followed by a marker bit.
    fn decode_time(&mut self) -> f64 {
        let mut clock = (self.buffer.read(3) as u64) << 30;
        self.buffer.skip(1);
        clock |= (self.buffer.read(15) as u64) << 15;
        self.buffer.skip(1);
        clock |= self.buffer.read(15) as u64;
        self.buffer.skip(1);
        clock_to_seconds(clock)
    }
}

impl std::fmt::Debug for Demuxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Demuxer")
            .field("has_headers", &self.has_headers)
            .field("num_audio_streams", &self.num_audio_streams)
            .field("num_video_streams", &self.num_video_streams)
            .field("last_decoded_pts", &self.last_decoded_pts)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

/// Check whether a PES payload contains the start of an intra-coded
/// picture: the picture start code followed by picture-type bits equal to 1.
fn payload_starts_intra_picture(payload: &[u8]) -> bool {
    if payload.len() < 6 {
        return false;
    }
    for i in 0..payload.len() - 5 {
        if payload[i] == 0x00 && payload[i + 1] == 0x00 && payload[i + 2] == 0x01 && payload[i + 3] == 0x00
        {
            return (payload[i + 5] & 0x38) == 0x08;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use kino_core::buffer::BitWriter;
    use crate::STREAM_AUDIO_1;

    fn write_pack_header(w: &mut BitWriter, scr: u64) {
        w.write_bytes(&[0x00, 0x00, 0x01, PACK_HEADER_CODE]);
        w.write_bits(0b0010, 4);
        w.write_bits(((scr >> 30) & 0x7) as u32, 3);
        w.write_bits(1, 1);
        w.write_bits(((scr >> 15) & 0x7FFF) as u32, 15);
        w.write_bits(1, 1);
        w.write_bits((scr & 0x7FFF) as u32, 15);
        w.write_bits(1, 1);
        w.write_bits(1, 1);
        w.write_bits(1000, 22); // mux rate
        w.write_bits(1, 1);
    }

    fn write_system_header(w: &mut BitWriter, audio: u32, video: u32) {
        w.write_bytes(&[0x00, 0x00, 0x01, SYSTEM_HEADER_CODE]);
        w.write_bits(7, 16); // header length
        w.write_bits(1, 1);
        w.write_bits(50_000, 22); // rate bound
        w.write_bits(1, 1);
        w.write_bits(audio, 6);
        w.write_bits(0, 5);
        w.write_bits(video, 5);
    }

    fn write_pts(w: &mut BitWriter, prefix: u32, clock: u64) {
        w.write_bits(prefix, 4);
        w.write_bits(((clock >> 30) & 0x7) as u32, 3);
        w.write_bits(1, 1);
        w.write_bits(((clock >> 15) & 0x7FFF) as u32, 15);
        w.write_bits(1, 1);
        w.write_bits((clock & 0x7FFF) as u32, 15);
        w.write_bits(1, 1);
    }

    fn write_pes(w: &mut BitWriter, stream_id: u8, pts_clock: Option<u64>, payload: &[u8]) {
        w.write_bytes(&[0x00, 0x00, 0x01, stream_id]);
        let header_len = if pts_clock.is_some() { 5 } else { 1 };
        w.write_bits((header_len + payload.len()) as u32, 16);
        match pts_clock {
            Some(clock) => write_pts(w, 0b0010, clock),
            None => w.write_bits(0b0000_1111, 8),
        }
        w.write_bytes(payload);
    }

    fn intra_payload(filler: usize) -> Vec<u8> {
        let mut payload = vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x08];
        payload.extend(std::iter::repeat(0xA5).take(filler));
        payload
    }

    /// Program end code plus padding, so the last PES header is decodable
    /// (the demuxer wants 16 buffered bytes past a start code).
    fn write_end(w: &mut BitWriter) {
        w.write_bytes(&[0x00, 0x00, 0x01, 0xB9]);
        w.write_bytes(&[0u8; 12]);
    }

    fn minimal_ps(video_payload: &[u8], audio_payload: &[u8]) -> Vec<u8> {
        let mut w = BitWriter::new();
        write_pack_header(&mut w, 0);
        write_system_header(&mut w, 1, 1);
        write_pes(&mut w, STREAM_VIDEO_1, Some(0), video_payload);
        write_pes(&mut w, STREAM_AUDIO_1, Some(3600), audio_payload);
        write_end(&mut w);
        w.into_data()
    }

    #[test]
    fn test_headers_and_stream_counts() {
        let data = minimal_ps(&[1, 2, 3], &[4, 5]);
        let mut demux = Demuxer::new(BitBuffer::from_vec(data));
        assert!(demux.has_headers());
        assert_eq!(demux.num_video_streams(), 1);
        assert_eq!(demux.num_audio_streams(), 1);
    }

    #[test]
    fn test_decode_packets_in_order() {
        let data = minimal_ps(&[1, 2, 3], &[4, 5]);
        let mut demux = Demuxer::new(BitBuffer::from_vec(data));

        {
            let packet = demux.decode().expect("video packet");
            assert_eq!(packet.stream_id, STREAM_VIDEO_1);
            assert_eq!(packet.payload(), &[1, 2, 3]);
            assert_eq!(packet.pts, 0.0);
        }
        {
            let packet = demux.decode().expect("audio packet");
            assert_eq!(packet.stream_id, STREAM_AUDIO_1);
            assert_eq!(packet.payload(), &[4, 5]);
            assert!((packet.pts - 0.04).abs() < 1e-9);
        }
        assert!(demux.decode().is_none());
    }

    #[test]
    fn test_pts_decode_is_exact() {
        // 33-bit clock with all group boundaries exercised.
        let clock: u64 = 0b101_0101_0101_0101_0101_0101_0101_0101_01;
        let mut w = BitWriter::new();
        write_pack_header(&mut w, 0);
        write_system_header(&mut w, 0, 1);
        write_pes(&mut w, STREAM_VIDEO_1, Some(clock), &[0]);

        let mut demux = Demuxer::new(BitBuffer::from_vec(w.into_data()));
        let packet = demux.decode().expect("packet");
        assert_eq!(packet.pts, clock as f64 / 90_000.0);
    }

    #[test]
    fn test_packet_without_pts() {
        let mut w = BitWriter::new();
        write_pack_header(&mut w, 0);
        write_system_header(&mut w, 0, 1);
        write_pes(&mut w, STREAM_VIDEO_1, None, &[9, 9, 9]);

        let mut demux = Demuxer::new(BitBuffer::from_vec(w.into_data()));
        let packet = demux.decode().expect("packet");
        assert!(!packet.has_pts());
        assert_eq!(packet.payload(), &[9, 9, 9]);
    }

    #[test]
    fn test_stuffing_bytes_are_stripped() {
        let mut w = BitWriter::new();
        write_pack_header(&mut w, 0);
        write_system_header(&mut w, 0, 1);
        // PES with 3 stuffing bytes before the no-PTS marker.
        w.write_bytes(&[0x00, 0x00, 0x01, STREAM_VIDEO_1]);
        w.write_bits(3 + 1 + 2, 16);
        w.write_bytes(&[0xFF, 0xFF, 0xFF]);
        w.write_bits(0b0000_1111, 8);
        w.write_bytes(&[0xAB, 0xCD]);
        write_end(&mut w);

        let mut demux = Demuxer::new(BitBuffer::from_vec(w.into_data()));
        let packet = demux.decode().expect("packet");
        assert_eq!(packet.payload(), &[0xAB, 0xCD]);
    }

    #[test]
    fn test_byte_accounting() {
        // Sum of payloads plus all header/stuffing bytes equals file size.
        let video = intra_payload(40);
        let audio = vec![7u8; 17];
        let data = minimal_ps(&video, &audio);
        let file_size = data.len();

        let mut demux = Demuxer::new(BitBuffer::from_vec(data));
        let mut payload_sum = 0;
        let mut packets = 0;
        loop {
            let len = match demux.decode() {
                Some(packet) => packet.len(),
                None => break,
            };
            payload_sum += len;
            packets += 1;
        }
        assert_eq!(packets, 2);

        // Per packet: 4 start code + 2 length + 5 PTS bytes of header.
        let header_bytes = packets * (4 + 2 + 5);
        let pack_and_system = (4 + 8) + (4 + 7);
        let end_marker = 4 + 12;
        assert_eq!(
            payload_sum + header_bytes + pack_and_system + end_marker,
            file_size
        );
    }

    #[test]
    fn test_rewind_replays_from_start() {
        let data = minimal_ps(&[1, 2, 3], &[4, 5]);
        let mut demux = Demuxer::new(BitBuffer::from_vec(data));

        let first: Vec<u8> = demux.decode().unwrap().payload().to_vec();
        while demux.decode().is_some() {}
        assert!(demux.decode().is_none());

        demux.rewind();
        let replay: Vec<u8> = demux.decode().unwrap().payload().to_vec();
        assert_eq!(first, replay);
    }

    #[test]
    fn test_incremental_feed() {
        // Feeding the stream a few bytes at a time never produces a bogus
        // packet, and eventually produces them all.
        let data = minimal_ps(&[1, 2, 3], &[4, 5]);
        let mut demux = Demuxer::new(BitBuffer::appending());

        let mut packets = 0;
        for chunk in data.chunks(3) {
            demux.buffer_mut().write(chunk).unwrap();
            while let Some(packet) = demux.decode() {
                match packets {
                    0 => assert_eq!(packet.payload(), &[1, 2, 3]),
                    1 => assert_eq!(packet.payload(), &[4, 5]),
                    n => panic!("unexpected packet {n}"),
                }
                packets += 1;
            }
        }
        assert_eq!(packets, 2);
    }

    fn long_ps(seconds: usize) -> Vec<u8> {
        let mut w = BitWriter::new();
        write_pack_header(&mut w, 0);
        write_system_header(&mut w, 0, 1);
        for s in 0..seconds {
            let payload = intra_payload(200);
            write_pes(&mut w, STREAM_VIDEO_1, Some((s as u64) * 90_000), &payload);
        }
        write_end(&mut w);
        w.into_data()
    }

    #[test]
    fn test_start_time_and_duration() {
        let data = long_ps(30);
        let mut demux = Demuxer::new(BitBuffer::from_vec(data));
        assert_eq!(demux.get_start_time(STREAM_VIDEO_1), 0.0);
        assert_eq!(demux.get_duration(STREAM_VIDEO_1), 29.0);

        // The probe restored the cursor: decoding still starts at packet 0.
        let packet = demux.decode().expect("packet");
        assert_eq!(packet.pts, 0.0);
    }

    #[test]
    fn test_seek_force_intra() {
        let data = long_ps(30);
        let mut demux = Demuxer::new(BitBuffer::from_vec(data));

        let (pts, is_intra) = {
            let packet = demux
                .seek(10.0, STREAM_VIDEO_1, true)
                .expect("seek should land on a packet");
            (packet.pts, payload_starts_intra_picture(packet.payload()))
        };
        assert!(is_intra);
        assert!(pts <= 10.0, "landed at {pts}");
        assert!(pts > 8.0, "landed too early at {pts}");

        // Decoding continues from the seek target.
        let next = demux.decode().expect("next packet");
        assert!(next.pts > pts);
    }

    #[test]
    fn test_seek_without_intra_constraint() {
        let data = long_ps(30);
        let mut demux = Demuxer::new(BitBuffer::from_vec(data));
        let packet = demux.seek(25.5, STREAM_VIDEO_1, false).expect("packet");
        assert!(packet.pts <= 25.5);
    }

    #[test]
    fn test_intra_pattern_detection() {
        assert!(payload_starts_intra_picture(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x08]));
        // Picture type 2 (predictive) is bits 0x10.
        assert!(!payload_starts_intra_picture(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x10]));
        assert!(!payload_starts_intra_picture(&[0x00, 0x00, 0x01, 0xB3, 0x00, 0x08]));
        assert!(!payload_starts_intra_picture(&[0x00, 0x00]));
    }
}
