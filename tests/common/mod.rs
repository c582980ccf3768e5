//! Builders for synthetic AVIF files and AV1 sequence headers.
#![allow(dead_code)]

use avif_sanitize::{write_file, AvifFile};
use std::io::Cursor;

pub type TestFile = AvifFile<Cursor<Vec<u8>>>;

pub fn bx(typ: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(8 + body.len());
    v.extend_from_slice(&((8 + body.len()) as u32).to_be_bytes());
    v.extend_from_slice(typ);
    v.extend_from_slice(body);
    v
}

pub fn full_bx(typ: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
    let mut b = vec![version];
    b.extend_from_slice(&flags.to_be_bytes()[1..]);
    b.extend_from_slice(body);
    bx(typ, &b)
}

pub fn parse(bytes: &[u8]) -> TestFile {
    AvifFile::parse(Cursor::new(bytes.to_vec())).expect("parse failed")
}

pub fn write(file: &mut TestFile) -> Vec<u8> {
    write_file(file, Cursor::new(Vec::new())).expect("write failed").into_inner()
}

// ---------- AV1 bitstream ----------

#[derive(Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    nbits: usize,
}

impl BitWriter {
    pub fn put(&mut self, value: u32, n: u8) {
        for i in (0..n).rev() {
            if self.nbits % 8 == 0 {
                self.bytes.push(0);
            }
            if (value >> i) & 1 == 1 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 0x80 >> (self.nbits % 8);
            }
            self.nbits += 1;
        }
    }

    pub fn flag(&mut self, b: bool) {
        self.put(b as u32, 1);
    }

    /// Appends `trailing_bits()` and returns the bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.put(1, 1);
        self.bytes
    }
}

#[derive(Debug, Clone)]
pub struct SeqParams {
    pub profile: u8,
    pub level: u8,
    pub tier: u8,
    pub reduced: bool,
    pub timing_info: bool,
    pub initial_display_delay: bool,
    pub width: u32,
    pub height: u32,
    pub high_bitdepth: bool,
    pub twelve_bit: bool,
    pub mono: bool,
    pub color: Option<(u8, u8, u8)>,
    pub full_range: bool,
    /// Only coded for 12-bit profile 2 streams.
    pub subsampling: (bool, bool),
    pub chroma_sample_position: u8,
    pub film_grain: bool,
}

impl Default for SeqParams {
    fn default() -> Self {
        Self {
            profile: 0,
            level: 5,
            tier: 0,
            reduced: true,
            timing_info: false,
            initial_display_delay: false,
            width: 64,
            height: 48,
            high_bitdepth: false,
            twelve_bit: false,
            mono: false,
            color: Some((1, 13, 6)),
            full_range: true,
            subsampling: (true, true),
            chroma_sample_position: 0,
            film_grain: false,
        }
    }
}

impl SeqParams {
    pub fn bit_depth(&self) -> u8 {
        match (self.profile == 2 && self.high_bitdepth && self.twelve_bit, self.high_bitdepth) {
            (true, _) => 12,
            (false, true) => 10,
            _ => 8,
        }
    }

    fn srgb(&self) -> bool {
        self.color == Some((1, 13, 0))
    }

    /// Chroma subsampling the decoder derives.
    pub fn derived_subsampling(&self) -> (bool, bool) {
        if self.mono {
            return (true, true);
        }
        if self.srgb() {
            return (false, false);
        }
        match self.profile {
            0 => (true, true),
            1 => (false, false),
            _ if self.bit_depth() == 12 => (self.subsampling.0, self.subsampling.0 && self.subsampling.1),
            _ => (true, false),
        }
    }

    pub fn derived_full_range(&self) -> bool {
        self.srgb() || self.full_range
    }
}

pub fn sequence_header_payload(p: &SeqParams) -> Vec<u8> {
    let mut w = BitWriter::default();
    w.put(p.profile as u32, 3);
    w.flag(true); // still_picture
    w.flag(p.reduced);
    if p.reduced {
        w.put(p.level as u32, 5);
    } else {
        w.flag(p.timing_info);
        if p.timing_info {
            return w.finish();
        }
        w.flag(p.initial_display_delay);
        w.put(0, 5); // one operating point
        w.put(0, 12);
        w.put(p.level as u32, 5);
        if p.level > 7 {
            w.put(p.tier as u32, 1);
        }
        if p.initial_display_delay {
            w.flag(true);
            w.put(9, 4);
        }
    }

    w.put(15, 4);
    w.put(15, 4);
    w.put(p.width - 1, 16);
    w.put(p.height - 1, 16);
    if !p.reduced {
        w.flag(false); // frame_id_numbers_present_flag
    }
    w.flag(false); // use_128x128_superblock
    w.flag(false); // enable_filter_intra
    w.flag(false); // enable_intra_edge_filter
    if !p.reduced {
        for _ in 0..4 {
            w.flag(false); // interintra, masked, warped motion, dual filter
        }
        w.flag(false); // enable_order_hint
        w.flag(true); // seq_choose_screen_content_tools
        w.flag(true); // seq_choose_integer_mv
    }
    w.flag(false); // enable_superres
    w.flag(false); // enable_cdef
    w.flag(false); // enable_restoration

    // color_config
    w.flag(p.high_bitdepth);
    if p.profile == 2 && p.high_bitdepth {
        w.flag(p.twelve_bit);
    }
    if p.profile != 1 {
        w.flag(p.mono);
    }
    w.flag(p.color.is_some());
    if let Some((cp, tc, mc)) = p.color {
        w.put(cp as u32, 8);
        w.put(tc as u32, 8);
        w.put(mc as u32, 8);
    }
    if p.mono {
        w.flag(p.full_range);
    } else {
        if !p.srgb() {
            w.flag(p.full_range);
            if p.profile == 2 && p.bit_depth() == 12 {
                w.flag(p.subsampling.0);
                if p.subsampling.0 {
                    w.flag(p.subsampling.1);
                }
            }
            let (ssx, ssy) = p.derived_subsampling();
            if ssx && ssy {
                w.put(p.chroma_sample_position as u32, 2);
            }
        }
        w.flag(false); // separate_uv_delta_q
    }
    w.flag(p.film_grain);
    w.finish()
}

pub fn leb128(mut value: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// OBU with `obu_has_size_field` set and no extension.
pub fn obu(obu_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut v = vec![obu_type << 3 | 0x02];
    v.extend(leb128(payload.len()));
    v.extend_from_slice(payload);
    v
}

/// Temporal delimiter, sequence header and a dummy frame OBU.
pub fn av1_stream(p: &SeqParams) -> Vec<u8> {
    [obu(2, &[]), obu(1, &sequence_header_payload(p)), obu(6, &[0xAA; 12])].concat()
}

// ---------- Property boxes ----------

pub fn av1c_for(p: &SeqParams) -> Vec<u8> {
    let (ssx, ssy) = p.derived_subsampling();
    let csp = if ssx && ssy && !p.mono { p.chroma_sample_position } else { 0 };
    let twelve = p.bit_depth() == 12;
    let b2 = p.tier << 7
        | (p.high_bitdepth as u8) << 6
        | (twelve as u8) << 5
        | (p.mono as u8) << 4
        | (ssx as u8) << 3
        | (ssy as u8) << 2
        | csp;
    bx(b"av1C", &[0x81, p.profile << 5 | p.level, b2, 0])
}

pub fn ispe(width: u32, height: u32) -> Vec<u8> {
    let mut b = width.to_be_bytes().to_vec();
    b.extend_from_slice(&height.to_be_bytes());
    full_bx(b"ispe", 0, 0, &b)
}

pub fn pixi(bits: &[u8]) -> Vec<u8> {
    let mut b = vec![bits.len() as u8];
    b.extend_from_slice(bits);
    full_bx(b"pixi", 0, 0, &b)
}

pub fn nclx(cp: u16, tc: u16, mc: u16, full_range: bool) -> Vec<u8> {
    let mut b = b"nclx".to_vec();
    for v in [cp, tc, mc] {
        b.extend_from_slice(&v.to_be_bytes());
    }
    b.push((full_range as u8) << 7);
    bx(b"colr", &b)
}

pub fn clap(w: (i32, i32), h: (i32, i32), ho: (i32, i32), vo: (i32, i32)) -> Vec<u8> {
    let mut b = Vec::new();
    for (n, d) in [w, h, ho, vo] {
        b.extend_from_slice(&n.to_be_bytes());
        b.extend_from_slice(&d.to_be_bytes());
    }
    bx(b"clap", &b)
}

/// A property set that passes validation for `p`, associated as av1C, ispe, pixi, colr.
pub fn clean_properties(p: &SeqParams) -> (Vec<Vec<u8>>, Vec<(u8, bool)>) {
    let (cp, tc, mc) = p.color.unwrap_or((1, 13, 6));
    let planes = if p.mono { 1 } else { 3 };
    (
        vec![
            av1c_for(p),
            ispe(p.width, p.height),
            pixi(&vec![p.bit_depth(); planes]),
            nclx(cp as u16, tc as u16, mc as u16, p.derived_full_range()),
        ],
        vec![(1, true), (2, false), (3, false), (4, true)],
    )
}

// ---------- File builder ----------

#[derive(Debug, Clone)]
pub struct ItemSpec {
    pub id: u16,
    pub item_type: &'static [u8; 4],
    pub payload: Vec<u8>,
    pub properties: Vec<(u8, bool)>,
    pub hidden: bool,
}

impl ItemSpec {
    pub fn av01(id: u16, p: &SeqParams, properties: Vec<(u8, bool)>) -> Self {
        Self { id, item_type: b"av01", payload: av1_stream(p), properties, hidden: false }
    }
}

#[derive(Debug, Clone)]
pub struct TrackSpec {
    pub track_id: u32,
    pub handler: &'static [u8; 4],
    /// Raw `hdlr` name bytes, terminator included.
    pub handler_name: Vec<u8>,
    pub track_in_movie: bool,
    pub aux: bool,
    pub sample_entry_children: Vec<Vec<u8>>,
    pub chunk: Vec<u8>,
}

impl TrackSpec {
    pub fn pict(track_id: u32, p: &SeqParams) -> Self {
        Self {
            track_id,
            handler: b"pict",
            handler_name: vec![0],
            track_in_movie: true,
            aux: false,
            sample_entry_children: vec![av1c_for(p)],
            chunk: av1_stream(p),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AvifSpec {
    pub major: &'static [u8; 4],
    pub compatible: Vec<&'static [u8; 4]>,
    pub items: Vec<ItemSpec>,
    pub properties: Vec<Vec<u8>>,
    pub pitm: Option<u16>,
    /// Store item locations as base offset plus a zero extent offset.
    pub base_offset: bool,
    /// Number of leading items whose payloads go to an `mdat` placed before `meta`.
    pub leading_mdat_items: usize,
    pub extra_meta: Vec<Vec<u8>>,
    pub tracks: Vec<TrackSpec>,
}

impl AvifSpec {
    /// One `av01` item (id 1, primary) with the given properties.
    pub fn single(p: &SeqParams, properties: Vec<Vec<u8>>, associations: Vec<(u8, bool)>) -> Self {
        Self {
            major: b"avif",
            compatible: vec![b"avif", b"mif1", b"miaf"],
            items: vec![ItemSpec::av01(1, p, associations)],
            properties,
            pitm: Some(1),
            base_offset: false,
            leading_mdat_items: 0,
            extra_meta: Vec::new(),
            tracks: Vec::new(),
        }
    }

    /// A file that passes validation.
    pub fn clean(p: &SeqParams) -> Self {
        let (properties, associations) = clean_properties(p);
        Self::single(p, properties, associations)
    }

    pub fn build(&self) -> Vec<u8> {
        let (head, _) = self.layout(0);
        let mdat_body_start = head.len() as u64 + 8;
        let (head, mdat_body) = self.layout(mdat_body_start);
        [head, bx(b"mdat", &mdat_body)].concat()
    }

    /// File without the `mdat`, plus the `mdat` payload, for payload data starting at `data_start`.
    fn layout(&self, data_start: u64) -> (Vec<u8>, Vec<u8>) {
        let mut ftyp = self.major.to_vec();
        ftyp.extend_from_slice(&0u32.to_be_bytes());
        for b in &self.compatible {
            ftyp.extend_from_slice(*b);
        }
        let ftyp = bx(b"ftyp", &ftyp);

        let lead_start = ftyp.len() as u64 + 8;
        let mut lead = Vec::new();
        let mut mdat = Vec::new();
        let mut item_offsets = Vec::new();
        for (i, item) in self.items.iter().enumerate() {
            if i < self.leading_mdat_items {
                item_offsets.push(lead_start + lead.len() as u64);
                lead.extend_from_slice(&item.payload);
            } else {
                item_offsets.push(data_start + mdat.len() as u64);
                mdat.extend_from_slice(&item.payload);
            }
        }
        let mut chunk_offsets = Vec::new();
        for track in &self.tracks {
            chunk_offsets.push(data_start + mdat.len() as u64);
            mdat.extend_from_slice(&track.chunk);
        }

        let mut head = ftyp;
        if self.leading_mdat_items > 0 {
            head.extend(bx(b"mdat", &lead));
        }
        head.extend(self.meta(&item_offsets));
        if !self.tracks.is_empty() {
            let traks: Vec<u8> = self
                .tracks
                .iter()
                .zip(&chunk_offsets)
                .flat_map(|(t, &off)| trak(t, off))
                .collect();
            head.extend(bx(b"moov", &traks));
        }
        (head, mdat)
    }

    fn meta(&self, item_offsets: &[u64]) -> Vec<u8> {
        let mut hdlr = 0u32.to_be_bytes().to_vec();
        hdlr.extend_from_slice(b"pict");
        hdlr.extend_from_slice(&[0u8; 12]);
        hdlr.push(0);
        let mut meta = full_bx(b"hdlr", 0, 0, &hdlr);

        if let Some(id) = self.pitm {
            meta.extend(full_bx(b"pitm", 0, 0, &id.to_be_bytes()));
        }

        let base_size = if self.base_offset { 4 } else { 0 };
        let mut iloc = vec![0x44, base_size << 4];
        iloc.extend_from_slice(&(self.items.len() as u16).to_be_bytes());
        for (item, &offset) in self.items.iter().zip(item_offsets) {
            iloc.extend_from_slice(&item.id.to_be_bytes());
            iloc.extend_from_slice(&0u16.to_be_bytes());
            if self.base_offset {
                iloc.extend_from_slice(&(offset as u32).to_be_bytes());
            }
            iloc.extend_from_slice(&1u16.to_be_bytes());
            let extent_offset = if self.base_offset { 0 } else { offset as u32 };
            iloc.extend_from_slice(&extent_offset.to_be_bytes());
            iloc.extend_from_slice(&(item.payload.len() as u32).to_be_bytes());
        }
        meta.extend(full_bx(b"iloc", 0, 0, &iloc));

        let mut iinf = (self.items.len() as u16).to_be_bytes().to_vec();
        for item in &self.items {
            let mut infe = item.id.to_be_bytes().to_vec();
            infe.extend_from_slice(&0u16.to_be_bytes());
            infe.extend_from_slice(item.item_type);
            infe.push(0);
            iinf.extend(full_bx(b"infe", 2, item.hidden as u32, &infe));
        }
        meta.extend(full_bx(b"iinf", 0, 0, &iinf));

        for extra in &self.extra_meta {
            meta.extend_from_slice(extra);
        }

        let ipco = bx(b"ipco", &self.properties.concat());
        let mut ipma = (self.items.len() as u32).to_be_bytes().to_vec();
        for item in &self.items {
            ipma.extend_from_slice(&item.id.to_be_bytes());
            ipma.push(item.properties.len() as u8);
            for &(index, essential) in &item.properties {
                ipma.push((essential as u8) << 7 | index);
            }
        }
        let iprp = bx(b"iprp", &[ipco, full_bx(b"ipma", 0, 0, &ipma)].concat());
        meta.extend(iprp);

        full_bx(b"meta", 0, 0, &meta)
    }
}

pub fn iref_dimg(from: u16, to: &[u16]) -> Vec<u8> {
    let mut dimg = from.to_be_bytes().to_vec();
    dimg.extend_from_slice(&(to.len() as u16).to_be_bytes());
    for id in to {
        dimg.extend_from_slice(&id.to_be_bytes());
    }
    full_bx(b"iref", 0, 0, &bx(b"dimg", &dimg))
}

fn trak(t: &TrackSpec, chunk_offset: u64) -> Vec<u8> {
    let mut tkhd = Vec::new();
    tkhd.extend_from_slice(&0u32.to_be_bytes()); // creation_time
    tkhd.extend_from_slice(&0u32.to_be_bytes()); // modification_time
    tkhd.extend_from_slice(&t.track_id.to_be_bytes());
    tkhd.extend_from_slice(&0u32.to_be_bytes());
    tkhd.extend_from_slice(&0u32.to_be_bytes()); // duration
    tkhd.extend_from_slice(&[0u8; 8]);
    tkhd.extend_from_slice(&[0u8; 8]); // layer, alternate_group, volume, reserved
    for m in [0x10000u32, 0, 0, 0, 0x10000, 0, 0, 0, 0x40000000] {
        tkhd.extend_from_slice(&m.to_be_bytes());
    }
    tkhd.extend_from_slice(&(64u32 << 16).to_be_bytes());
    tkhd.extend_from_slice(&(48u32 << 16).to_be_bytes());
    let flags = if t.track_in_movie { 0x3 } else { 0x1 };

    let mut hdlr = 0u32.to_be_bytes().to_vec();
    hdlr.extend_from_slice(t.handler);
    hdlr.extend_from_slice(&[0u8; 12]);
    hdlr.extend_from_slice(&t.handler_name);

    let mut dref = 1u32.to_be_bytes().to_vec();
    dref.extend(full_bx(b"url ", 0, 1, &[]));
    let dinf = bx(b"dinf", &full_bx(b"dref", 0, 0, &dref));

    let mut av01 = vec![0u8; 78];
    av01[7] = 1; // data_reference_index
    av01.extend(t.sample_entry_children.concat());
    let mut stsd = 1u32.to_be_bytes().to_vec();
    stsd.extend(bx(b"av01", &av01));

    let mut stco = 1u32.to_be_bytes().to_vec();
    stco.extend_from_slice(&(chunk_offset as u32).to_be_bytes());

    let stbl = bx(b"stbl", &[full_bx(b"stsd", 0, 0, &stsd), full_bx(b"stco", 0, 0, &stco)].concat());
    let minf = bx(b"minf", &[dinf, stbl].concat());
    let mdia = bx(b"mdia", &[full_bx(b"hdlr", 0, 0, &hdlr), minf].concat());

    let mut trak = full_bx(b"tkhd", 0, flags, &tkhd);
    if t.aux {
        trak.extend(bx(b"tref", &bx(b"auxl", &1u32.to_be_bytes())));
    }
    trak.extend(mdia);
    bx(b"trak", &trak)
}
