//! Container reader: memory-maps an index file and answers queries through
//! zero-copy views into the mapping.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use super::{
    Section, FLAG_LEARNED_OCC, FLAG_VEB_LAYOUT, FOOTER_SENTINEL, HEADER_LEN, INDEX_MAGIC,
    INDEX_VERSION, NUM_SECTIONS,
};
use crate::bitvec::{BitVectorRef, RankSupport, SUB_BLOCK_BITS, SUPER_BLOCK_BITS};
use crate::error::{Error, Result};
use crate::learned::{LearnedConfig, LearnedOccTable};
use crate::veb::{MACROBLOCK_BYTES, TOP_LEVELS};
use crate::wavelet::NUM_LEVELS;
use crate::{IndexView, OccBackend};

/// Read-only index backed by a memory-mapped container file.
///
/// All query methods answer out of the mapping without copying (the learned
/// backend, when flagged, is rebuilt once at open time since the container
/// carries no learned section). The mapping is never mutated.
pub struct MappedIndex {
    mmap: Mmap,
    text_len: usize,
    flags: u32,
    text_range: ByteRange,
    bwt_range: ByteRange,
    count_range: ByteRange,
    sampling_rate: usize,
    samples_range: ByteRange,
    levels: Vec<LevelSlices>,
    learned: Option<LearnedOccTable>,
}

type ByteRange = (usize, usize);

// Precomputed byte ranges of one wavelet level inside the mapping, so query
// views are assembled without re-validation.
struct LevelSlices {
    n_bits: usize,
    num_ones: usize,
    words: ByteRange,
    supers: ByteRange,
    subs: ByteRange,
}

impl MappedIndex {
    /// Opens and validates a container file. The file is rejected (nothing
    /// is kept mapped) on any magic, version, bounds or footer mismatch.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };

        let header = Header::decode(&mmap)?;
        let n = header.text_len as usize;

        let footer_offset = header.section(Section::Footer)?;
        if read_u64(&mmap, footer_offset)? != FOOTER_SENTINEL {
            return Err(Error::Format("missing footer sentinel".into()));
        }

        let text_range = length_prefixed(&mmap, header.section(Section::Text)?, 1, n)?;
        let bwt_range = length_prefixed(&mmap, header.section(Section::Bwt)?, 1, n)?;
        let count_range = length_prefixed(&mmap, header.section(Section::CArray)?, 4, 257)?;

        let ssa_offset = header.section(Section::Ssa)?;
        let sampling_rate = read_u32(&mmap, ssa_offset)? as usize;
        if sampling_rate == 0 {
            return Err(Error::Format("zero suffix array sampling rate".into()));
        }
        let samples_range =
            length_prefixed(&mmap, ssa_offset + 8, 4, n.div_ceil(sampling_rate))?;

        let levels = decode_wavelet_levels(&mmap, header.section(Section::Wavelet)?, n)?;

        let levels = if header.flags & FLAG_VEB_LAYOUT != 0 {
            decode_veb_levels(&mmap, header.section(Section::VebLayout)?, n)?
        } else {
            levels
        };

        // typed casts must hold for every precomputed range
        let mut index = Self {
            mmap,
            text_len: n,
            flags: header.flags,
            text_range,
            bwt_range,
            count_range,
            sampling_rate,
            samples_range,
            levels,
            learned: None,
        };
        index.validate_casts()?;

        if header.flags & FLAG_LEARNED_OCC != 0 {
            let learned = {
                let views: Vec<BitVectorRef<'_>> =
                    (0..NUM_LEVELS).map(|level| index.level_ref(level)).collect();
                LearnedOccTable::from_level_refs(&views, LearnedConfig::default())?
            };
            index.learned = Some(learned);
        }

        Ok(index)
    }

    /// Number of occurrences of `pattern`; same conventions as
    /// [`FmIndex::count`](crate::FmIndex::count).
    pub fn count(&self, pattern: &[u8]) -> usize {
        self.view().count(pattern)
    }

    /// Occurrence positions of `pattern`, at most `limit` of them.
    pub fn locate(&self, pattern: &[u8], limit: usize) -> Result<Vec<u64>> {
        self.view().locate(pattern, limit)
    }

    /// The text slice `T[pos..min(pos + len, n))`, served from the mapping.
    pub fn extract(&self, pos: usize, len: usize) -> &[u8] {
        self.view().extract(pos, len)
    }

    pub fn text_len(&self) -> usize {
        self.text_len
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn sampling_rate(&self) -> usize {
        self.sampling_rate
    }

    fn bytes(&self, range: ByteRange) -> &[u8] {
        &self.mmap[range.0..range.1]
    }

    fn level_ref(&self, level: usize) -> BitVectorRef<'_> {
        let slices = &self.levels[level];
        BitVectorRef::from_raw_parts(
            slices.n_bits,
            slices.num_ones,
            bytemuck::cast_slice(self.bytes(slices.words)),
            bytemuck::cast_slice(self.bytes(slices.supers)),
            bytemuck::cast_slice(self.bytes(slices.subs)),
        )
    }

    fn validate_casts(&mut self) -> Result<()> {
        let count_table: &[u32] = bytemuck::try_cast_slice(self.bytes(self.count_range))
            .map_err(|_| Error::Format("misaligned count table".into()))?;
        if count_table[256] as usize != self.text_len {
            return Err(Error::Format("count table does not sum to text length".into()));
        }
        bytemuck::try_cast_slice::<u8, u32>(self.bytes(self.samples_range))
            .map_err(|_| Error::Format("misaligned suffix array samples".into()))?;

        for (level, slices) in self.levels.iter_mut().enumerate() {
            let words: &[u64] = bytemuck::try_cast_slice(&self.mmap[slices.words.0..slices.words.1])
                .map_err(|_| Error::Format(format!("misaligned words of level {level}")))?;
            let supers: &[u32] =
                bytemuck::try_cast_slice(&self.mmap[slices.supers.0..slices.supers.1])
                    .map_err(|_| Error::Format(format!("misaligned super ranks of level {level}")))?;
            let subs: &[u16] = bytemuck::try_cast_slice(&self.mmap[slices.subs.0..slices.subs.1])
                .map_err(|_| Error::Format(format!("misaligned sub ranks of level {level}")))?;

            let view = BitVectorRef::from_parts(slices.n_bits, words, supers, subs);
            slices.num_ones = view.count_ones();
        }

        Ok(())
    }

    fn view(&self) -> IndexView<'_> {
        let occ = match &self.learned {
            Some(learned) => OccBackend::Learned(learned),
            None => OccBackend::Sampled(core::array::from_fn(|l| self.level_ref(l))),
        };

        IndexView {
            n: self.text_len,
            count_table: bytemuck::cast_slice(self.bytes(self.count_range)),
            bwt: self.bytes(self.bwt_range),
            text: self.bytes(self.text_range),
            sampling_rate: self.sampling_rate,
            samples: bytemuck::cast_slice(self.bytes(self.samples_range)),
            occ,
        }
    }
}

struct Header {
    flags: u32,
    text_len: u64,
    offsets: [u64; NUM_SECTIONS],
    file_len: usize,
}

impl Header {
    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::Format("file too small to contain a header".into()));
        }
        if data[0..8] != INDEX_MAGIC {
            return Err(Error::Format("bad magic".into()));
        }
        let version = u16::from_le_bytes(data[8..10].try_into().unwrap());
        if version != INDEX_VERSION {
            return Err(Error::Format(format!("unsupported version {version}")));
        }

        let flags = u32::from_le_bytes(data[12..16].try_into().unwrap());
        let text_len = u64::from_le_bytes(data[16..24].try_into().unwrap());
        let mut offsets = [0u64; NUM_SECTIONS];
        for (i, offset) in offsets.iter_mut().enumerate() {
            *offset = u64::from_le_bytes(data[24 + i * 8..32 + i * 8].try_into().unwrap());
        }

        Ok(Self {
            flags,
            text_len,
            offsets,
            file_len: data.len(),
        })
    }

    fn section(&self, section: Section) -> Result<usize> {
        let offset = self.offsets[section as usize] as usize;
        if offset < HEADER_LEN || offset >= self.file_len {
            return Err(Error::Format(format!(
                "section {section:?} offset {offset} out of bounds"
            )));
        }
        Ok(offset)
    }
}

// [count u64][element * count]; verifies the count and the bounds, returns
// the payload byte range
fn length_prefixed(
    data: &[u8],
    offset: usize,
    element_size: usize,
    expected_count: usize,
) -> Result<ByteRange> {
    let count = read_u64(data, offset)? as usize;
    if count != expected_count {
        return Err(Error::Format(format!(
            "array at offset {offset} has {count} elements, expected {expected_count}"
        )));
    }
    let start = offset + 8;
    let end = start
        .checked_add(count * element_size)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| Error::Format(format!("array at offset {offset} exceeds the file")))?;
    Ok((start, end))
}

fn decode_wavelet_levels(data: &[u8], offset: usize, n: usize) -> Result<Vec<LevelSlices>> {
    let num_levels = read_u64(data, offset)? as usize;
    if num_levels != NUM_LEVELS {
        return Err(Error::Format(format!(
            "wavelet section has {num_levels} levels, expected {NUM_LEVELS}"
        )));
    }

    let words_per_level = n.div_ceil(64);
    let supers_per_level = n.div_ceil(SUPER_BLOCK_BITS);
    let subs_per_level = n.div_ceil(SUB_BLOCK_BITS);

    let words = length_prefixed(data, offset + 8, 8, NUM_LEVELS * words_per_level)?;
    let supers = length_prefixed(data, words.1, 4, NUM_LEVELS * supers_per_level)?;
    let subs = length_prefixed(data, supers.1, 2, NUM_LEVELS * subs_per_level)?;

    let levels = (0..NUM_LEVELS)
        .map(|level| LevelSlices {
            n_bits: n,
            num_ones: 0,
            words: (
                words.0 + level * words_per_level * 8,
                words.0 + (level + 1) * words_per_level * 8,
            ),
            supers: (
                supers.0 + level * supers_per_level * 4,
                supers.0 + (level + 1) * supers_per_level * 4,
            ),
            subs: (
                subs.0 + level * subs_per_level * 2,
                subs.0 + (level + 1) * subs_per_level * 2,
            ),
        })
        .collect();

    Ok(levels)
}

// Replays the vEB layout walk over the section payload and records where
// each level's arrays live, relative to the whole mapping.
fn decode_veb_levels(data: &[u8], offset: usize, n: usize) -> Result<Vec<LevelSlices>> {
    let size = read_u64(data, offset)? as usize;
    let payload_start = offset + 8;
    if size % MACROBLOCK_BYTES != 0 {
        return Err(Error::Format(
            "vEB layout size is not a macroblock multiple".into(),
        ));
    }
    let payload_end = payload_start
        .checked_add(size)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| Error::Format("vEB layout exceeds the file".into()))?;

    let words_bytes = n.div_ceil(64) * 8;
    let supers_bytes = n.div_ceil(SUPER_BLOCK_BITS) * 4;
    let subs_bytes = n.div_ceil(SUB_BLOCK_BITS) * 2;
    let serialized = 8 + words_bytes + supers_bytes + subs_bytes;

    let mut levels = Vec::with_capacity(NUM_LEVELS);
    let mut cursor = 0usize;

    for level in 0..NUM_LEVELS {
        let alignment = if level < TOP_LEVELS { 8 } else { MACROBLOCK_BYTES };
        cursor = cursor.next_multiple_of(alignment);

        if cursor + serialized > payload_end - payload_start {
            return Err(Error::Format(format!(
                "vEB layout ends before level {level}"
            )));
        }

        let header = payload_start + cursor;
        let n_bits = read_u64(data, header)? as usize;
        if n_bits != n {
            return Err(Error::Format(format!(
                "vEB level {level} has {n_bits} bits, expected {n}"
            )));
        }

        let words_start = header + 8;
        let supers_start = words_start + words_bytes;
        let subs_start = supers_start + supers_bytes;

        levels.push(LevelSlices {
            n_bits,
            num_ones: 0,
            words: (words_start, supers_start),
            supers: (supers_start, subs_start),
            subs: (subs_start, subs_start + subs_bytes),
        });

        cursor += serialized;
    }

    Ok(levels)
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64> {
    let bytes = data
        .get(offset..offset + 8)
        .ok_or_else(|| Error::Format(format!("read past end of file at offset {offset}")))?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    let bytes = data
        .get(offset..offset + 4)
        .ok_or_else(|| Error::Format(format!("read past end of file at offset {offset}")))?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}
