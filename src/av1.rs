//! AV1 elementary stream decoding, limited to what is needed to derive
//! container properties: OBU framing and the Sequence Header OBU (AV1 §5.3, §5.5).

use crate::bits::BitCursor;
use crate::body::{Av1Config, Colr};
use crate::error::{Error, Result};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObuType {
    Reserved = 0,
    SequenceHeader = 1,
    TemporalDelimiter = 2,
    FrameHeader = 3,
    TileGroup = 4,
    Metadata = 5,
    Frame = 6,
    RedundantFrameHeader = 7,
    TileList = 8,
    Padding = 15,
}

impl ObuType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ObuType::Reserved),
            1 => Some(ObuType::SequenceHeader),
            2 => Some(ObuType::TemporalDelimiter),
            3 => Some(ObuType::FrameHeader),
            4 => Some(ObuType::TileGroup),
            5 => Some(ObuType::Metadata),
            6 => Some(ObuType::Frame),
            7 => Some(ObuType::RedundantFrameHeader),
            8 => Some(ObuType::TileList),
            15 => Some(ObuType::Padding),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObuHeader {
    pub forbidden_bit: bool,
    /// Raw 4-bit type; see [`ObuHeader::kind`].
    pub obu_type: u8,
    pub has_extension: bool,
    pub has_size_field: bool,
    pub reserved_bit: bool,
    pub temporal_id: u8,
    pub spatial_id: u8,
}

impl ObuHeader {
    pub fn read(bits: &mut BitCursor<'_>) -> Result<Self> {
        let forbidden_bit = bits.flag()?;
        let obu_type = bits.f(4)? as u8;
        let has_extension = bits.flag()?;
        let has_size_field = bits.flag()?;
        let reserved_bit = bits.flag()?;
        let (mut temporal_id, mut spatial_id) = (0, 0);
        if has_extension {
            temporal_id = bits.f(3)? as u8;
            spatial_id = bits.f(2)? as u8;
            let _reserved = bits.f(3)?;
        }
        Ok(Self {
            forbidden_bit,
            obu_type,
            has_extension,
            has_size_field,
            reserved_bit,
            temporal_id,
            spatial_id,
        })
    }

    pub fn kind(&self) -> Option<ObuType> {
        ObuType::from_u8(self.obu_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingPoint {
    pub idc: u16,
    pub seq_level_idx: u8,
    pub seq_tier: u8,
    pub initial_display_delay_minus_1: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorConfig {
    pub high_bitdepth: bool,
    pub twelve_bit: bool,
    pub bit_depth: u8,
    pub mono_chrome: bool,
    pub color_description_present: bool,
    pub color_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
    pub color_range: bool,
    pub subsampling_x: bool,
    pub subsampling_y: bool,
    pub chroma_sample_position: u8,
    pub separate_uv_delta_q: bool,
}

impl ColorConfig {
    pub fn num_planes(&self) -> u8 {
        if self.mono_chrome { 1 } else { 3 }
    }

    fn read(bits: &mut BitCursor<'_>, seq_profile: u8) -> Result<Self> {
        let high_bitdepth = bits.flag()?;
        let twelve_bit = seq_profile == 2 && high_bitdepth && bits.flag()?;
        let bit_depth = match (twelve_bit, high_bitdepth) {
            (true, _) => 12,
            (false, true) => 10,
            (false, false) => 8,
        };
        let mono_chrome = seq_profile != 1 && bits.flag()?;

        let color_description_present = bits.flag()?;
        let (color_primaries, transfer_characteristics, matrix_coefficients) = if color_description_present {
            (bits.f(8)? as u8, bits.f(8)? as u8, bits.f(8)? as u8)
        } else {
            // CP_UNSPECIFIED, TC_UNSPECIFIED, MC_UNSPECIFIED
            (2, 2, 2)
        };

        let mut cc = ColorConfig {
            high_bitdepth,
            twelve_bit,
            bit_depth,
            mono_chrome,
            color_description_present,
            color_primaries,
            transfer_characteristics,
            matrix_coefficients,
            color_range: false,
            subsampling_x: true,
            subsampling_y: true,
            chroma_sample_position: 0,
            separate_uv_delta_q: false,
        };

        if mono_chrome {
            cc.color_range = bits.flag()?;
            return Ok(cc);
        }

        if (color_primaries, transfer_characteristics, matrix_coefficients) == (1, 13, 0) {
            // sRGB: full range 4:4:4 without further bits
            cc.color_range = true;
            cc.subsampling_x = false;
            cc.subsampling_y = false;
        } else {
            cc.color_range = bits.flag()?;
            match seq_profile {
                0 => (cc.subsampling_x, cc.subsampling_y) = (true, true),
                1 => (cc.subsampling_x, cc.subsampling_y) = (false, false),
                _ if bit_depth == 12 => {
                    cc.subsampling_x = bits.flag()?;
                    cc.subsampling_y = cc.subsampling_x && bits.flag()?;
                }
                _ => (cc.subsampling_x, cc.subsampling_y) = (true, false),
            }
            if cc.subsampling_x && cc.subsampling_y {
                cc.chroma_sample_position = bits.f(2)? as u8;
            }
        }
        cc.separate_uv_delta_q = bits.flag()?;
        Ok(cc)
    }
}

/// Decoded Sequence Header OBU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceHeader {
    pub seq_profile: u8,
    pub still_picture: bool,
    pub reduced_still_picture_header: bool,
    pub initial_display_delay_present: bool,
    pub operating_points: Vec<OperatingPoint>,
    pub max_frame_width_minus_1: u32,
    pub max_frame_height_minus_1: u32,
    pub frame_id_numbers_present: bool,
    pub use_128x128_superblock: bool,
    pub enable_filter_intra: bool,
    pub enable_intra_edge_filter: bool,
    pub enable_order_hint: bool,
    pub order_hint_bits: u8,
    pub enable_superres: bool,
    pub enable_cdef: bool,
    pub enable_restoration: bool,
    pub color: ColorConfig,
    pub film_grain_params_present: bool,
}

const SELECT_SCREEN_CONTENT_TOOLS: u32 = 2;

impl SequenceHeader {
    /// Decodes a Sequence Header OBU payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut bits = BitCursor::new(payload);
        let bits = &mut bits;

        let seq_profile = bits.f(3)? as u8;
        if seq_profile > 2 {
            return Err(Error::unsupported(format!("seq_profile {seq_profile}")));
        }
        let still_picture = bits.flag()?;
        let reduced_still_picture_header = bits.flag()?;

        let mut initial_display_delay_present = false;
        let mut operating_points = Vec::new();
        if reduced_still_picture_header {
            operating_points.push(OperatingPoint {
                idc: 0,
                seq_level_idx: bits.f(5)? as u8,
                seq_tier: 0,
                initial_display_delay_minus_1: None,
            });
        } else {
            if bits.flag()? {
                return Err(Error::unsupported("timing_info_present_flag in sequence header"));
            }
            initial_display_delay_present = bits.flag()?;
            let count = bits.f(5)? + 1;
            for _ in 0..count {
                let idc = bits.f(12)? as u16;
                let seq_level_idx = bits.f(5)? as u8;
                let seq_tier = if seq_level_idx > 7 { bits.f(1)? as u8 } else { 0 };
                let mut initial_display_delay_minus_1 = None;
                if initial_display_delay_present && bits.flag()? {
                    initial_display_delay_minus_1 = Some(bits.f(4)? as u8);
                }
                operating_points.push(OperatingPoint {
                    idc,
                    seq_level_idx,
                    seq_tier,
                    initial_display_delay_minus_1,
                });
            }
        }

        let frame_width_bits = bits.f(4)? as u8 + 1;
        let frame_height_bits = bits.f(4)? as u8 + 1;
        let max_frame_width_minus_1 = bits.f(frame_width_bits)?;
        let max_frame_height_minus_1 = bits.f(frame_height_bits)?;

        let frame_id_numbers_present = !reduced_still_picture_header && bits.flag()?;
        if frame_id_numbers_present {
            let _delta_frame_id_length_minus_2 = bits.f(4)?;
            let _additional_frame_id_length_minus_1 = bits.f(3)?;
        }

        let use_128x128_superblock = bits.flag()?;
        let enable_filter_intra = bits.flag()?;
        let enable_intra_edge_filter = bits.flag()?;

        let mut enable_order_hint = false;
        let mut order_hint_bits = 0;
        if !reduced_still_picture_header {
            let _enable_interintra_compound = bits.flag()?;
            let _enable_masked_compound = bits.flag()?;
            let _enable_warped_motion = bits.flag()?;
            let _enable_dual_filter = bits.flag()?;
            enable_order_hint = bits.flag()?;
            if enable_order_hint {
                let _enable_jnt_comp = bits.flag()?;
                let _enable_ref_frame_mvs = bits.flag()?;
            }
            let seq_force_screen_content_tools = if bits.flag()? {
                SELECT_SCREEN_CONTENT_TOOLS
            } else {
                bits.f(1)?
            };
            if seq_force_screen_content_tools > 0 {
                let seq_choose_integer_mv = bits.flag()?;
                if !seq_choose_integer_mv {
                    let _seq_force_integer_mv = bits.f(1)?;
                }
            }
            if enable_order_hint {
                order_hint_bits = bits.f(3)? as u8 + 1;
            }
        }

        let enable_superres = bits.flag()?;
        let enable_cdef = bits.flag()?;
        let enable_restoration = bits.flag()?;
        let color = ColorConfig::read(bits, seq_profile)?;
        let film_grain_params_present = bits.flag()?;

        Ok(SequenceHeader {
            seq_profile,
            still_picture,
            reduced_still_picture_header,
            initial_display_delay_present,
            operating_points,
            max_frame_width_minus_1,
            max_frame_height_minus_1,
            frame_id_numbers_present,
            use_128x128_superblock,
            enable_filter_intra,
            enable_intra_edge_filter,
            enable_order_hint,
            order_hint_bits,
            enable_superres,
            enable_cdef,
            enable_restoration,
            color,
            film_grain_params_present,
        })
    }

    fn first_operating_point(&self) -> Result<&OperatingPoint> {
        self.operating_points
            .first()
            .ok_or(Error::InvalidData("sequence header without operating points"))
    }

    /// The `av1C` record describing this sequence.
    pub fn av1_config(&self) -> Result<Av1Config> {
        if self.initial_display_delay_present {
            return Err(Error::unsupported("initial_display_delay_present_flag in sequence header"));
        }
        let op = self.first_operating_point()?;
        let c = &self.color;
        Ok(Av1Config {
            marker: 1,
            version: 1,
            seq_profile: self.seq_profile,
            seq_level_idx_0: op.seq_level_idx,
            seq_tier_0: op.seq_tier,
            high_bitdepth: c.high_bitdepth as u8,
            twelve_bit: c.twelve_bit as u8,
            monochrome: c.mono_chrome as u8,
            chroma_subsampling_x: c.subsampling_x as u8,
            chroma_subsampling_y: c.subsampling_y as u8,
            chroma_sample_position: c.chroma_sample_position,
            initial_presentation_delay: None,
        })
    }

    /// `nclx` colour description carried by the sequence header.
    pub fn nclx(&self) -> Colr {
        Colr::Nclx {
            color_primaries: self.color.color_primaries as u16,
            transfer_characteristics: self.color.transfer_characteristics as u16,
            matrix_coefficients: self.color.matrix_coefficients as u16,
            full_range: self.color.color_range,
        }
    }

    /// Image spatial extents as `(width, height)`.
    pub fn extents(&self) -> (u32, u32) {
        (self.max_frame_width_minus_1 + 1, self.max_frame_height_minus_1 + 1)
    }

    /// Bits per channel, one entry per plane.
    pub fn bits_per_channel(&self) -> Vec<u8> {
        vec![self.color.bit_depth; self.color.num_planes() as usize]
    }
}

/// Walks the OBUs of an elementary stream and decodes the first Sequence Header.
pub fn find_sequence_header(data: &[u8]) -> Result<Option<SequenceHeader>> {
    let mut bits = BitCursor::new(data);
    while !bits.is_empty() {
        let header = ObuHeader::read(&mut bits)?;
        if !header.has_size_field {
            return Err(Error::unsupported("OBUs without obu_size field"));
        }
        let size = bits.leb128()?;
        let size = usize::try_from(size).map_err(|_| Error::InvalidData("OBU size overflows"))?;
        let payload = bits.bytes(size)?;
        debug!("OBU type {} ({:?}), {} bytes", header.obu_type, header.kind(), size);
        if header.kind() == Some(ObuType::SequenceHeader) {
            return SequenceHeader::parse(payload).map(Some);
        }
    }
    Ok(None)
}
