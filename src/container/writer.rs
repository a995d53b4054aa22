//! Container writer: streams the index sections into a file and patches the
//! header once all offsets are known.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use super::{
    Section, FOOTER_SENTINEL, HEADER_LEN, INDEX_MAGIC, INDEX_VERSION, NUM_SECTIONS,
};
use crate::error::Result;
use crate::veb::MACROBLOCK_BYTES;
use crate::FmIndex;

pub(crate) fn write_index(index: &FmIndex, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = SectionWriter {
        out: BufWriter::with_capacity(1 << 16, file),
        position: 0,
    };
    let mut offsets = [0u64; NUM_SECTIONS];

    // header is rewritten at the end, once the offsets are known
    writer.write_raw(&[0u8; HEADER_LEN])?;

    writer.align_to(8)?;
    offsets[Section::Text as usize] = writer.position;
    writer.write_u64(index.text().len() as u64)?;
    writer.write_raw(index.text())?;

    writer.align_to(8)?;
    offsets[Section::Bwt as usize] = writer.position;
    writer.write_u64(index.bwt().len() as u64)?;
    writer.write_raw(index.bwt())?;

    writer.align_to(8)?;
    offsets[Section::CArray as usize] = writer.position;
    writer.write_u64(index.count_table().len() as u64)?;
    for &entry in index.count_table() {
        writer.write_raw(&entry.to_le_bytes())?;
    }

    let samples = index.suffix_array_samples();
    writer.align_to(8)?;
    offsets[Section::Ssa as usize] = writer.position;
    writer.write_raw(&(samples.sampling_rate() as u32).to_le_bytes())?;
    writer.align_to(8)?;
    writer.write_u64(samples.samples().len() as u64)?;
    for &sample in samples.samples() {
        writer.write_raw(&sample.to_le_bytes())?;
    }

    write_wavelet_section(&mut writer, &mut offsets, index)?;

    if let Some(veb) = index.veb_layout() {
        writer.align_to(MACROBLOCK_BYTES as u64)?;
        offsets[Section::VebLayout as usize] = writer.position;
        writer.write_u64(veb.len() as u64)?;
        writer.write_raw(veb.data())?;
    }

    writer.align_to(8)?;
    offsets[Section::Footer as usize] = writer.position;
    writer.write_u64(FOOTER_SENTINEL)?;

    let mut file = writer.finish()?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&encode_header(
        index.config().flags(),
        index.text().len() as u64,
        &offsets,
    ))?;
    file.flush()?;

    log::debug!(
        "wrote container: {} bytes, flags {:#x}",
        offsets[Section::Footer as usize] + 8,
        index.config().flags()
    );

    Ok(())
}

// [num_levels u64][bits_count u64][words][super_count u64][supers]
// [sub_count u64][subs], each array the concatenation over all levels
fn write_wavelet_section(
    writer: &mut SectionWriter,
    offsets: &mut [u64; NUM_SECTIONS],
    index: &FmIndex,
) -> Result<()> {
    let levels = index.wavelet().levels();

    writer.align_to(8)?;
    offsets[Section::Wavelet as usize] = writer.position;
    writer.write_u64(levels.len() as u64)?;

    let bits_count: usize = levels.iter().map(|level| level.words().len()).sum();
    writer.write_u64(bits_count as u64)?;
    for level in levels {
        for &word in level.words() {
            writer.write_raw(&word.to_le_bytes())?;
        }
    }

    let super_count: usize = levels.iter().map(|level| level.super_ranks().len()).sum();
    writer.write_u64(super_count as u64)?;
    for level in levels {
        for &rank in level.super_ranks() {
            writer.write_raw(&rank.to_le_bytes())?;
        }
    }

    let sub_count: usize = levels.iter().map(|level| level.sub_ranks().len()).sum();
    writer.write_u64(sub_count as u64)?;
    for level in levels {
        for &rank in level.sub_ranks() {
            writer.write_raw(&rank.to_le_bytes())?;
        }
    }

    Ok(())
}

fn encode_header(flags: u32, text_len: u64, offsets: &[u64; NUM_SECTIONS]) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0..8].copy_from_slice(&INDEX_MAGIC);
    header[8..10].copy_from_slice(&INDEX_VERSION.to_le_bytes());
    // bytes 10..12 reserved
    header[12..16].copy_from_slice(&flags.to_le_bytes());
    header[16..24].copy_from_slice(&text_len.to_le_bytes());
    for (i, &offset) in offsets.iter().enumerate() {
        header[24 + i * 8..32 + i * 8].copy_from_slice(&offset.to_le_bytes());
    }
    header
}

struct SectionWriter {
    out: BufWriter<File>,
    position: u64,
}

impl SectionWriter {
    fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.out.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    fn align_to(&mut self, alignment: u64) -> Result<()> {
        let padded = self.position.next_multiple_of(alignment);
        let zeros = [0u8; 64];
        let mut remaining = (padded - self.position) as usize;
        while remaining > 0 {
            let chunk = remaining.min(zeros.len());
            self.write_raw(&zeros[..chunk])?;
            remaining -= chunk;
        }
        Ok(())
    }

    fn finish(self) -> Result<File> {
        Ok(self.out.into_inner().map_err(|e| e.into_error())?)
    }
}
