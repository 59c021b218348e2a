//! End-to-end player tests over a hand-assembled program stream carrying
//! one flat intra video frame and one silent audio frame.

use kino::{Player, BitBuffer, SAMPLES_PER_FRAME};
use kino_core::buffer::BitWriter;

const STREAM_VIDEO: u8 = 0xE0;
const STREAM_AUDIO: u8 = 0xC0;

fn write_pack_header(w: &mut BitWriter) {
    w.write_bytes(&[0x00, 0x00, 0x01, 0xBA]);
    w.write_bits(0b0010, 4);
    w.write_bits(0, 3);
    w.write_bits(1, 1);
    w.write_bits(0, 15);
    w.write_bits(1, 1);
    w.write_bits(0, 15);
    w.write_bits(1, 1);
    w.write_bits(1, 1);
    w.write_bits(1000, 22);
    w.write_bits(1, 1);
}

fn write_system_header(w: &mut BitWriter, audio: u32, video: u32) {
    w.write_bytes(&[0x00, 0x00, 0x01, 0xBB]);
    w.write_bits(7, 16);
    w.write_bits(1, 1);
    w.write_bits(50_000, 22);
    w.write_bits(1, 1);
    w.write_bits(audio, 6);
    w.write_bits(0, 5);
    w.write_bits(video, 5);
}

fn write_pes(w: &mut BitWriter, stream_id: u8, pts_clock: u64, payload: &[u8]) {
    w.write_bytes(&[0x00, 0x00, 0x01, stream_id]);
    w.write_bits((5 + payload.len()) as u32, 16);
    w.write_bits(0b0010, 4);
    w.write_bits(((pts_clock >> 30) & 0x7) as u32, 3);
    w.write_bits(1, 1);
    w.write_bits(((pts_clock >> 15) & 0x7FFF) as u32, 15);
    w.write_bits(1, 1);
    w.write_bits((pts_clock & 0x7FFF) as u32, 15);
    w.write_bits(1, 1);
    w.write_bytes(payload);
}

fn write_end(w: &mut BitWriter) {
    w.write_bytes(&[0x00, 0x00, 0x01, 0xB9]);
    w.write_bytes(&[0u8; 12]);
}

/// A 16x16 video elementary stream: sequence header plus one intra picture
/// whose luma decodes to a flat 192.
fn video_es() -> Vec<u8> {
    let mut w = BitWriter::new();
    // Sequence header: 16x16 @ 25 fps, default matrices.
    w.write_bytes(&[0x00, 0x00, 0x01, 0xB3]);
    w.write_bits(16, 12);
    w.write_bits(16, 12);
    w.write_bits(1, 4);
    w.write_bits(3, 4);
    w.write_bits(10_000, 18);
    w.write_bits(1, 1);
    w.write_bits(0, 10);
    w.write_bits(0, 1);
    w.write_bits(0, 1);
    w.write_bits(0, 1);
    w.align();
    // Picture header, type I.
    w.write_bytes(&[0x00, 0x00, 0x01, 0x00]);
    w.write_bits(0, 10);
    w.write_bits(1, 3);
    w.write_bits(0xFFFF, 16);
    w.align();
    // One slice, one intra macroblock, flat DC.
    w.write_bytes(&[0x00, 0x00, 0x01, 0x01]);
    w.write_bits(1, 5);
    w.write_bits(0, 1);
    w.write_bits(1, 1); // address increment 1
    w.write_bits(1, 1); // macroblock type: intra
    w.write_bits(0b111110, 6); // luma DC size 7
    w.write_bits(64, 7); // differential: +64
    w.write_bits(0b10, 2); // end of block
    for _ in 0..3 {
        w.write_bits(0b100, 3);
        w.write_bits(0b10, 2);
    }
    for _ in 0..2 {
        w.write_bits(0b00, 2);
        w.write_bits(0b10, 2);
    }
    w.align();
    let mut data = w.into_data();
    // Room for the worst-case sequence header lookahead.
    data.resize(data.len() + 160, 0);
    data
}

/// One silent MP2 frame: MPEG-1 Layer II, 48 kbit/s, 44.1 kHz, mono.
fn audio_es() -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(0x7FF, 11);
    w.write_bits(0x3, 2); // MPEG-1
    w.write_bits(0x2, 2); // Layer II
    w.write_bits(1, 1); // no CRC
    w.write_bits(2, 4); // 48 kbit/s
    w.write_bits(0, 2); // 44.1 kHz
    w.write_bits(0, 2); // no padding, private
    w.write_bits(0x3, 2); // mono
    w.write_bits(0, 6); // extension, copyright, original, emphasis
    let mut data = w.into_data();
    data.resize(144_000 * 48 / 44_100, 0);
    data
}

fn test_stream() -> Vec<u8> {
    let mut w = BitWriter::new();
    write_pack_header(&mut w);
    write_system_header(&mut w, 1, 1);
    write_pes(&mut w, STREAM_VIDEO, 0, &video_es());
    write_pes(&mut w, STREAM_AUDIO, 0, &audio_es());
    write_end(&mut w);
    w.into_data()
}

#[test]
fn player_reports_stream_layout() {
    let mut player = Player::from_vec(test_stream());
    assert_eq!(player.num_video_streams(), 1);
    assert_eq!(player.num_audio_streams(), 1);
    assert_eq!(player.width(), 16);
    assert_eq!(player.height(), 16);
    assert_eq!(player.framerate(), 25.0);
    assert_eq!(player.samplerate(), 44_100);
}

#[test]
fn player_decodes_video_and_audio() {
    let mut player = Player::from_vec(test_stream());

    {
        let frame = player.decode_video().expect("one video frame");
        assert_eq!(frame.width, 16);
        assert_eq!(frame.time, 0.0);
        assert!(frame.y.data().iter().all(|&s| s == 192));
    }
    assert!(player.decode_video().is_none());

    {
        let samples = player.decode_audio().expect("one audio frame");
        assert_eq!(samples.left.len(), SAMPLES_PER_FRAME);
        assert!(samples.left.iter().all(|&s| s == 0.0));
        assert_eq!(samples.left, samples.right);
    }
    assert!(player.decode_audio().is_none());
    assert!(player.has_ended());
}

#[test]
fn player_rewind_replays() {
    let mut player = Player::from_vec(test_stream());

    let first = player.decode_video().expect("frame").y.data().to_vec();
    assert!(player.decode_video().is_none());

    player.rewind();
    assert_eq!(player.time(), 0.0);
    let replay = player.decode_video().expect("frame").y.data().to_vec();
    assert_eq!(first, replay);
}

#[test]
fn player_audio_stream_selection() {
    let mut player = Player::from_vec(test_stream());
    assert!(player.select_audio_stream(3).is_ok());
    assert!(player.select_audio_stream(4).is_err());

    // Stream 3 never receives data, so audio decoding yields nothing.
    player.select_audio_stream(3).unwrap();
    assert!(player.decode_audio().is_none());
}

#[test]
fn player_from_incremental_source() {
    // Feed the stream in small chunks through an append buffer.
    let data = test_stream();
    let mut player = Player::new(BitBuffer::appending());

    let mut frame_luma = None;
    for chunk in data.chunks(7) {
        player.write(chunk).unwrap();
        if frame_luma.is_none() {
            if let Some(frame) = player.decode_video() {
                frame_luma = Some(frame.y.sample(0, 0));
            }
        }
    }
    player.signal_end();
    if frame_luma.is_none() {
        frame_luma = player.decode_video().map(|f| f.y.sample(0, 0));
    }
    assert_eq!(frame_luma, Some(192));
}
