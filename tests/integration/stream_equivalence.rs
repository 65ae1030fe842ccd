// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Streaming across an arbitrary partition of a payload must match the
//! bulk result over the same payload, for both generate and verify.
//!
//! Each call's `md` argument is indexed from 0 by that call's own
//! completed-block count, so callers must hand it a slice starting at
//! the metadata offset of the first block this call might complete.

use dif_codec::{bulk, stream, DifContext, DifFlags, DifType, PiFormat, PiLocation};

const GUARD_INTERVAL: u32 = 512;
const MD_SIZE: u32 = 8;

fn ctx() -> DifContext {
    DifContext::new(
        520,
        MD_SIZE,
        true,
        PiLocation::Tail,
        DifType::Type1,
        PiFormat::Crc16,
        DifFlags::all(),
        7,
        0x9999,
        0xFFFF,
        0,
        0,
    )
    .unwrap()
}

fn bulk_md(payload: &[u8], num_blocks: u32) -> Vec<u8> {
    let block_size = 520usize;
    let mut interleaved = vec![0u8; block_size * num_blocks as usize];
    for i in 0..num_blocks as usize {
        interleaved[i * block_size..i * block_size + 512]
            .copy_from_slice(&payload[i * 512..i * 512 + 512]);
    }
    let c = ctx();
    {
        let mut iovs: [&mut [u8]; 1] = [&mut interleaved];
        bulk::generate(&c, &mut iovs, num_blocks).unwrap();
    }
    let mut md = vec![0u8; MD_SIZE as usize * num_blocks as usize];
    for i in 0..num_blocks as usize {
        md[i * 8..i * 8 + 8]
            .copy_from_slice(&interleaved[i * block_size + 512..i * block_size + 520]);
    }
    md
}

/// Feed `payload` through [`stream::generate_stream`] in the chunks
/// described by `splits`, handing each call the `md` slice that starts
/// at the first block this call might complete.
fn run_partition(payload: &[u8], num_blocks: u32, splits: &[u32]) -> Vec<u8> {
    let mut c = ctx();
    let mut md = vec![0u8; MD_SIZE as usize * num_blocks as usize];
    let mut offset = 0usize;
    let mut bytes_processed = 0u32;
    for &len in splits {
        let completed_before = bytes_processed / GUARD_INTERVAL;
        let md_start = (completed_before * MD_SIZE) as usize;
        let chunk: [&[u8]; 1] = [&payload[offset..offset + len as usize]];
        stream::generate_stream(&mut c, &chunk, &mut md[md_start..], len).unwrap();
        offset += len as usize;
        bytes_processed += len;
    }
    md
}

#[test]
fn three_way_partition_matches_bulk() {
    let payload: Vec<u8> = (0..(512 * 3)).map(|i| (i * 7 % 253) as u8).collect();
    let expected = bulk_md(&payload, 3);
    let got = run_partition(&payload, 3, &[300, 724, 512]);
    assert_eq!(got, expected);
}

#[test]
fn byte_at_a_time_partition_matches_bulk() {
    let payload = vec![0x6Eu8; 512 * 2];
    let expected = bulk_md(&payload, 2);
    let splits = vec![1u32; 1024];
    let got = run_partition(&payload, 2, &splits);
    assert_eq!(got, expected);
}

#[test]
fn verify_stream_over_partition_accepts_bulk_generated_payload() {
    let payload: Vec<u8> = (0..(512 * 2)).map(|i| (i % 200) as u8).collect();
    let md = bulk_md(&payload, 2);

    let mut c = ctx();
    let part_a: [&[u8]; 1] = [&payload[..700]];
    let part_b: [&[u8]; 1] = [&payload[700..]];
    // part_a completes only block 0, so it gets the whole buffer (it
    // only ever indexes into the first slot); part_b starts mid-block 1
    // relative to the payload, but the only block *it* completes is
    // block 1, so it needs the slice starting at that block's slot.
    stream::verify_stream(&mut c, &part_a, &md, 700).unwrap();
    stream::verify_stream(&mut c, &part_b, &md[8..], (payload.len() - 700) as u32).unwrap();
}
