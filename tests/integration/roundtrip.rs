// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Round-trip and sentinel-suppression properties, across a
//! representative sample of PI formats, DIF types, and block sizes
//! rather than an exhaustive grid.

use dif_codec::{bulk, DifContext, DifFlags, DifType, InjectFlags, PiFormat, PiLocation};

fn ctx(
    block_size: u32,
    md_size: u32,
    dif_type: DifType,
    pi_format: PiFormat,
    flags: DifFlags,
    app_tag: u16,
) -> DifContext {
    DifContext::new(
        block_size,
        md_size,
        true,
        PiLocation::Tail,
        dif_type,
        pi_format,
        flags,
        0,
        app_tag,
        0xFFFF,
        0,
        0,
    )
    .unwrap()
}

#[test]
fn roundtrip_crc16_type1_512_block() {
    let c = ctx(520, 8, DifType::Type1, PiFormat::Crc16, DifFlags::all(), 0x1234);
    let mut block = vec![0x5Au8; 520];
    {
        let mut iovs: [&mut [u8]; 1] = [&mut block];
        bulk::generate(&c, &mut iovs, 1).unwrap();
    }
    let data_before = block[..512].to_vec();
    let iovs: [&[u8]; 1] = [&block];
    bulk::verify(&c, &iovs, 1).unwrap();
    assert_eq!(&block[..512], &data_before[..]);
}

#[test]
fn roundtrip_crc32_type2_4096_block() {
    let c = ctx(4096 + 16, 16, DifType::Type2, PiFormat::Crc32, DifFlags::all(), 0x5678);
    let mut blocks = vec![0u8; (4096 + 16) * 2];
    {
        let mut iovs: [&mut [u8]; 1] = [&mut blocks];
        bulk::generate(&c, &mut iovs, 2).unwrap();
    }
    let iovs: [&[u8]; 1] = [&blocks];
    bulk::verify(&c, &iovs, 2).unwrap();
}

#[test]
fn roundtrip_crc64_type3_4160_block_guard_only() {
    let c = ctx(4160, 64, DifType::Type3, PiFormat::Crc64, DifFlags::GUARD_CHECK, 0);
    let mut block = vec![0x99u8; 4160];
    {
        let mut iovs: [&mut [u8]; 1] = [&mut block];
        bulk::generate(&c, &mut iovs, 1).unwrap();
    }
    let iovs: [&[u8]; 1] = [&block];
    bulk::verify(&c, &iovs, 1).unwrap();
}

#[test]
fn roundtrip_copy_paths_preserve_data() {
    let c = ctx(520, 8, DifType::Type1, PiFormat::Crc16, DifFlags::all(), 0x1234);
    let data = vec![0xC3u8; 512];
    let mut bounce = vec![0u8; 520];
    {
        let data_frag: &[u8] = &data;
        let data_iovs: [&[u8]; 1] = [data_frag];
        let mut bounce_iovs: [&mut [u8]; 1] = [&mut bounce];
        bulk::generate_copy(&c, &data_iovs, &mut bounce_iovs, 1).unwrap();
    }
    let mut recovered = vec![0u8; 512];
    {
        let bounce_frag: &[u8] = &bounce;
        let bounce_iovs: [&[u8]; 1] = [bounce_frag];
        let mut recovered_iovs: [&mut [u8]; 1] = [&mut recovered];
        bulk::verify_copy(&c, &mut recovered_iovs, &bounce_iovs, 1).unwrap();
    }
    assert_eq!(recovered, data);
}

#[test]
fn sentinel_app_and_ref_tag_suppresses_guard_check_even_after_corruption() {
    let c = ctx(
        520,
        8,
        DifType::Type1,
        PiFormat::Crc16,
        DifFlags::all(),
        0xFFFF,
    );
    // init_ref_tag=0 with TYPE1 means block 0's ref tag would be 0, not
    // the sentinel; force it via set_remapped_init_ref_tag-free path by
    // building the context with an app tag sentinel and manually
    // writing the ref tag sentinel into the PI after generation.
    let mut block = vec![0x11u8; 520];
    {
        let mut iovs: [&mut [u8]; 1] = [&mut block];
        bulk::generate(&c, &mut iovs, 1).unwrap();
    }
    // Overwrite the stored reference tag with the all-ones sentinel.
    block[516..520].copy_from_slice(&0xFFFF_FFFFu32.to_be_bytes());

    // Corrupt the data region; the sentinel rule must suppress every
    // subcheck, including the guard.
    block[0] ^= 0xFF;
    let iovs: [&[u8]; 1] = [&block];
    bulk::verify(&c, &iovs, 1).unwrap();
}

#[test]
fn type3_sentinel_scenario_ignores_guard_mismatch() {
    // Concrete scenario 6: TYPE3 with both sentinels set, any payload
    // verifies regardless of guard mismatch.
    let c = ctx(520, 8, DifType::Type3, PiFormat::Crc16, DifFlags::all(), 0xFFFF);
    let mut block = vec![0u8; 520];
    block[512..514].copy_from_slice(&0xDEADu16.to_be_bytes()); // bogus guard
    block[514..516].copy_from_slice(&0xFFFFu16.to_be_bytes()); // app tag sentinel
    block[516..520].copy_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // ref tag sentinel
    let iovs: [&[u8]; 1] = [&block];
    bulk::verify(&c, &iovs, 1).unwrap();
}

#[test]
fn inject_then_detect_all_four_kinds() {
    for flag in [
        InjectFlags::GUARD,
        InjectFlags::APPTAG,
        InjectFlags::REFTAG,
        InjectFlags::DATA,
    ] {
        let c = ctx(520, 8, DifType::Type1, PiFormat::Crc16, DifFlags::all(), 0x1234);
        let mut block = vec![0x22u8; 520];
        let injected_at = {
            let mut iovs: [&mut [u8]; 1] = [&mut block];
            bulk::generate(&c, &mut iovs, 1).unwrap();
            bulk::inject_error(&c, &mut iovs, 1, flag).unwrap()
        };
        let iovs: [&[u8]; 1] = [&block];
        let err = bulk::verify(&c, &iovs, 1).unwrap_err();
        let dif_codec::DifError::Check(check) = err else {
            panic!("expected a check error for {flag:?}");
        };
        assert_eq!(check.block_index, injected_at);
        let expected_kind = if flag == InjectFlags::DATA {
            // The guard covers the data region, so corrupting data is
            // only observable as a guard mismatch.
            dif_codec::CheckErrorKind::Guard
        } else if flag == InjectFlags::GUARD {
            dif_codec::CheckErrorKind::Guard
        } else if flag == InjectFlags::APPTAG {
            dif_codec::CheckErrorKind::AppTag
        } else {
            dif_codec::CheckErrorKind::RefTag
        };
        assert_eq!(check.kind, expected_kind);
    }
}
