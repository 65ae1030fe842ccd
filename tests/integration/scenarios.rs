// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The concrete worked scenarios: 16-bit format, TYPE1, all checks on,
//! `block_size=520`, `md_size=8`, `guard_interval=512`.

use dif_codec::{bulk, layout, CheckErrorKind, DifContext, DifError, DifFlags, DifType, PiFormat, PiLocation, PiTuple};

fn ctx(init_ref_tag: u64) -> DifContext {
    DifContext::new(
        520,
        8,
        true,
        PiLocation::Tail,
        DifType::Type1,
        PiFormat::Crc16,
        DifFlags::all(),
        init_ref_tag,
        0x1234,
        0xFFFF,
        0,
        0,
    )
    .unwrap()
}

#[test]
fn scenario_1_zero_data_gives_zero_guard() {
    let c = ctx(0);
    let mut block = vec![0u8; 520];
    let mut iovs: [&mut [u8]; 1] = [&mut block];
    bulk::generate(&c, &mut iovs, 1).unwrap();

    let tuple = PiTuple::read(PiFormat::Crc16, &block[512..520]);
    assert_eq!(tuple.guard, 0x0000);
    assert_eq!(tuple.app_tag, 0x1234);
    assert_eq!(tuple.ref_tag, 0x0000_0000);

    let iovs: [&[u8]; 1] = [&block];
    bulk::verify(&c, &iovs, 1).unwrap();
}

#[test]
fn scenario_2_flipped_byte_reports_guard_mismatch() {
    let c = ctx(0);
    let mut block = vec![0u8; 520];
    {
        let mut iovs: [&mut [u8]; 1] = [&mut block];
        bulk::generate(&c, &mut iovs, 1).unwrap();
    }
    block[0] = 0x01;
    let iovs: [&[u8]; 1] = [&block];
    let err = bulk::verify(&c, &iovs, 1).unwrap_err();
    let DifError::Check(check) = err else {
        panic!("expected a check error");
    };
    assert_eq!(check.kind, CheckErrorKind::Guard);
    assert_eq!(check.block_index, 0);
    assert_eq!(check.expected, 0x0000);

    // The mismatch's "actual" value is CRC16(0x01 || 511 zero bytes);
    // confirm it by generating fresh PI over that exact data rather
    // than re-deriving the polynomial here.
    let mut reference = vec![0u8; 520];
    reference[0] = 0x01;
    {
        let mut iovs: [&mut [u8]; 1] = [&mut reference];
        bulk::generate(&c, &mut iovs, 1).unwrap();
    }
    let expected_guard = PiTuple::read(PiFormat::Crc16, &reference[512..520]).guard;
    assert_eq!(check.actual, expected_guard);
}

#[test]
fn scenario_3_remap_then_verify_sequence() {
    let c = ctx(100);
    let mut blocks = vec![0u8; 520 * 4];
    {
        let mut iovs: [&mut [u8]; 1] = [&mut blocks];
        bulk::generate(&c, &mut iovs, 4).unwrap();
    }
    for i in 0..4u32 {
        let off = (i * 520 + 512) as usize;
        let tuple = PiTuple::read(PiFormat::Crc16, &blocks[off..off + 8]);
        assert_eq!(tuple.ref_tag, 100 + u64::from(i));
    }

    let mut remapper = c;
    remapper.set_remapped_init_ref_tag(200);
    {
        let mut iovs: [&mut [u8]; 1] = [&mut blocks];
        bulk::remap_ref_tag(&remapper, &mut iovs, 4, true).unwrap();
    }
    for i in 0..4u32 {
        let off = (i * 520 + 512) as usize;
        let tuple = PiTuple::read(PiFormat::Crc16, &blocks[off..off + 8]);
        assert_eq!(tuple.ref_tag, 200 + u64::from(i));
    }

    let verifier_200 = ctx(200);
    let iovs: [&[u8]; 1] = [&blocks];
    bulk::verify(&verifier_200, &iovs, 4).unwrap();

    let verifier_100 = ctx(100);
    let err = bulk::verify(&verifier_100, &iovs, 4).unwrap_err();
    let DifError::Check(check) = err else {
        panic!("expected a check error");
    };
    assert_eq!(check.kind, CheckErrorKind::RefTag);
    assert_eq!(check.block_index, 0);
}

#[test]
fn scenario_4_streaming_matches_bulk() {
    let mut gen_ctx = ctx(0);
    let payload: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
    let mut md_stream = vec![0u8; 16];
    {
        let whole: [&[u8]; 1] = [&payload];
        dif_codec::stream::generate_stream(&mut gen_ctx, &whole, &mut md_stream[..8], 300).unwrap();
    }
    {
        let part: [&[u8]; 1] = [&payload[300..]];
        dif_codec::stream::generate_stream(&mut gen_ctx, &part, &mut md_stream, 724).unwrap();
    }

    let bulk_ctx = ctx(0);

    // Build an interleaved buffer directly and generate over it in one
    // bulk call, then compare PI tuples block-by-block.
    let mut interleaved = vec![0u8; 520 * 2];
    interleaved[..512].copy_from_slice(&payload[..512]);
    interleaved[520..520 + 512].copy_from_slice(&payload[512..]);
    {
        let mut iovs: [&mut [u8]; 1] = [&mut interleaved];
        bulk::generate(&bulk_ctx, &mut iovs, 2).unwrap();
    }

    let stream_tuple_0 = PiTuple::read(PiFormat::Crc16, &md_stream[..8]);
    let stream_tuple_1 = PiTuple::read(PiFormat::Crc16, &md_stream[8..16]);
    let bulk_tuple_0 = PiTuple::read(PiFormat::Crc16, &interleaved[512..520]);
    let bulk_tuple_1 = PiTuple::read(PiFormat::Crc16, &interleaved[1032..1040]);
    assert_eq!(stream_tuple_0, bulk_tuple_0);
    assert_eq!(stream_tuple_1, bulk_tuple_1);
}

#[test]
fn scenario_5_set_md_interleave_iovs_two_blocks() {
    let c = ctx(0);
    let mut backing = vec![0u8; 4096];
    let mut out: [&mut [u8]; 4] = [&mut [], &mut [], &mut [], &mut []];
    let (count, mapped_len) =
        layout::set_md_interleave_iovs(&c, &mut backing, 0, 1024, &mut out).unwrap();
    assert_eq!(count, 2);
    assert_eq!(mapped_len, 1024);
    assert_eq!(out[0].len(), 512);
    assert_eq!(out[1].len(), 512);
}
