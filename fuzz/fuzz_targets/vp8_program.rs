#![no_main]

use hantro_codecs::backend::hantro::g1_regs::G1_REG_SPACE_SIZE;
use hantro_codecs::backend::hantro::g1_vp8_dec::Vp8Decoder;
use hantro_codecs::codec::vp8::frame::Frame;
use hantro_codecs::codec::vp8::partitions::STREAM_ALIGNMENT;
use hantro_codecs::decoder::m2m::format::PixFormat;
use hantro_codecs::decoder::m2m::format::NV12;
use hantro_codecs::decoder::m2m::CodecOps;
use hantro_codecs::decoder::m2m::ReferenceLookup;
use hantro_codecs::decoder::m2m::RunContext;
use hantro_codecs::device::dma::DmaAddr;
use hantro_codecs::device::dma::LinearDmaAllocator;
use hantro_codecs::device::regs::RegisterBank;
use hantro_codecs::Resolution;
use libfuzzer_sys::fuzz_target;

struct NoRefs;

impl ReferenceLookup for NoRefs {
    fn find_reference(&self, _: u64) -> Option<DmaAddr> {
        None
    }
}

fn u32_at(data: &[u8], pos: usize) -> u32 {
    let mut bytes = [0u8; 4];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = data.get(pos + i).copied().unwrap_or(0);
    }
    u32::from_le_bytes(bytes)
}

fuzz_target!(|data: &[u8]| {
    let mut frame = Frame::new();
    let hdr = &mut frame.header;
    hdr.key_frame = data.first().map(|b| b & 1 != 0).unwrap_or(true);
    hdr.version = data.get(1).copied().unwrap_or(0) & 0x3;
    hdr.num_dct_parts = 1 << (data.get(2).copied().unwrap_or(0) & 0x3);
    hdr.first_part_size = u32_at(data, 3) & 0x7ffff;
    hdr.header_size = u32_at(data, 7) % (hdr.first_part_size * 8 + 1);
    for (i, size) in hdr.partition_size.iter_mut().enumerate() {
        *size = u32_at(data, 11 + i * 4) & 0xffff;
    }
    let src_dma = u32_at(data, 43) & 0x0fff_ffff;

    let mut alloc = LinearDmaAllocator::new(0x4000_0000, 0x10000);
    let dst_format = PixFormat::new(NV12, Resolution::from((176, 144)));
    let mut decoder = Vp8Decoder::new();
    decoder.init(&mut alloc, &dst_format).unwrap();

    let mut regs = RegisterBank::new(G1_REG_SPACE_SIZE);
    let ctx = RunContext {
        frame: Some(&frame),
        src_dma,
        src_data: data,
        dst_dma: 0x2000_0000,
        dst_format: &dst_format,
        refs: &NoRefs,
    };

    let report = decoder.run(&mut regs, &ctx).unwrap();
    let layout = report.partitions.unwrap();

    assert_eq!(layout.control.base % STREAM_ALIGNMENT, 0);
    assert!(layout.control.start_bit < 64);
    for part in &layout.dct {
        assert_eq!(part.base % STREAM_ALIGNMENT, 0);
        assert!(part.start_bit < 64);
    }

    decoder.exit(&mut alloc);
    assert_eq!(alloc.allocated(), 0);
});
