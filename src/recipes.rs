use crate::boxes::{FourCC, FullBoxHeader};

/// The parent a box sequence is parsed in. Which boxes are understood depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    TopLevel,
    Meta,
    Iprp,
    Ipco,
    Iinf,
    Iref { wide_ids: bool },
    Moov,
    Trak,
    Tref,
    Mdia,
    Minf,
    Dinf,
    Dref,
    Stbl,
    Stsd,
    SampleEntry,
}

/// How the body of a recognised box is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKind {
    Ftyp,
    Tkhd,
    Hdlr,
    Pitm,
    Av1C,
    Iloc,
    Iinf,
    Infe,
    Iref,
    SingleItemReference { wide_ids: bool },
    Ipma,
    Colr,
    Pixi,
    Ispe,
    Clap,
    Stco,
    Co64,
    Stsd,
    Dref,
    DataEntryUrl,
    Av01SampleEntry,
    Ccst,
    Auxi,
    /// Keep the body bytes so the box compares by value.
    Raw,
}

impl BodyKind {
    /// Context of the boxes following the decoded part of the body, if the box has any.
    pub fn child_context(&self, full: Option<FullBoxHeader>) -> Option<Context> {
        match self {
            BodyKind::Iinf => Some(Context::Iinf),
            BodyKind::Iref => Some(Context::Iref {
                wide_ids: full.map(|f| f.version != 0).unwrap_or(false),
            }),
            BodyKind::Stsd => Some(Context::Stsd),
            BodyKind::Dref => Some(Context::Dref),
            BodyKind::Av01SampleEntry => Some(Context::SampleEntry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Not decoded; copied verbatim from the source.
    Opaque,
    /// Parsing must stop: the construct cannot be handled safely.
    Unsupported,
    /// Pure container.
    Children(Context),
    Body(BodyKind),
}

/// How to parse one box type within a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipe {
    pub name: &'static str,
    pub full_box: bool,
    pub dispatch: Dispatch,
}

impl Recipe {
    const fn new(name: &'static str, full_box: bool, dispatch: Dispatch) -> Self {
        Recipe { name, full_box, dispatch }
    }

    const fn container(name: &'static str, ctx: Context) -> Self {
        Recipe::new(name, false, Dispatch::Children(ctx))
    }

    const fn body(name: &'static str, kind: BodyKind) -> Self {
        Recipe::new(name, false, Dispatch::Body(kind))
    }

    const fn full(name: &'static str, kind: BodyKind) -> Self {
        Recipe::new(name, true, Dispatch::Body(kind))
    }

    pub fn is_container(&self) -> bool {
        matches!(self.dispatch, Dispatch::Children(_))
    }
}

const UNKNOWN: Recipe = Recipe::new("Unknown", false, Dispatch::Opaque);

/// Looks up the recipe for `typ` inside `ctx`, falling back to the context's default.
pub fn recipe_for(ctx: Context, typ: FourCC) -> Recipe {
    use BodyKind as K;
    match (ctx, &typ.0) {
        (Context::TopLevel, b"ftyp") => Recipe::body("File Type Box", K::Ftyp),
        (Context::TopLevel, b"meta") => {
            Recipe::new("Meta Box", true, Dispatch::Children(Context::Meta))
        }
        (Context::TopLevel, b"moov") => Recipe::container("Movie Box", Context::Moov),
        (Context::TopLevel, b"moof") => {
            Recipe::new("Movie Fragment Box", false, Dispatch::Unsupported)
        }
        (Context::TopLevel, _) => UNKNOWN,

        (Context::Meta, b"iprp") => Recipe::container("Item Properties Box", Context::Iprp),
        (Context::Meta, b"iloc") => Recipe::full("Item Location Box", K::Iloc),
        (Context::Meta, b"iinf") => Recipe::full("Item Information Box", K::Iinf),
        (Context::Meta, b"iref") => Recipe::full("Item Reference Box", K::Iref),
        (Context::Meta, b"pitm") => Recipe::full("Primary Item Box", K::Pitm),
        (Context::Meta, _) => UNKNOWN,

        (Context::Iprp, b"ipco") => Recipe::container("Item Property Container Box", Context::Ipco),
        (Context::Iprp, b"ipma") => Recipe::full("Item Property Association Box", K::Ipma),
        (Context::Iprp, _) => UNKNOWN,

        (Context::Ipco, b"av1C") => Recipe::body("AV1 Codec Configuration Box", K::Av1C),
        (Context::Ipco, b"colr") => Recipe::body("Colour Information Box", K::Colr),
        (Context::Ipco, b"pixi") => Recipe::full("Pixel Information Box", K::Pixi),
        (Context::Ipco, b"ispe") => Recipe::full("Image Spatial Extents Box", K::Ispe),
        (Context::Ipco, b"clap") => Recipe::body("Clean Aperture Box", K::Clap),
        (Context::Ipco, _) => Recipe::body("Item Property", K::Raw),

        (Context::Iinf, b"infe") => Recipe::full("Item Information Entry Box", K::Infe),
        (Context::Iinf, _) => UNKNOWN,

        (Context::Iref { wide_ids }, _) => {
            Recipe::body("Single Item Reference Box", K::SingleItemReference { wide_ids })
        }

        (Context::Moov, b"trak") => Recipe::container("Track Box", Context::Trak),
        (Context::Moov, _) => UNKNOWN,

        (Context::Trak, b"tkhd") => Recipe::full("Track Header Box", K::Tkhd),
        (Context::Trak, b"mdia") => Recipe::container("Media Box", Context::Mdia),
        (Context::Trak, b"tref") => Recipe::container("Track Reference Box", Context::Tref),
        (Context::Trak, _) => UNKNOWN,

        (Context::Tref, _) => UNKNOWN,

        (Context::Mdia, b"hdlr") => Recipe::full("Handler Reference Box", K::Hdlr),
        (Context::Mdia, b"minf") => Recipe::container("Media Information Box", Context::Minf),
        (Context::Mdia, _) => UNKNOWN,

        (Context::Minf, b"dinf") => Recipe::container("Data Information Box", Context::Dinf),
        (Context::Minf, b"stbl") => Recipe::container("Sample Table Box", Context::Stbl),
        (Context::Minf, _) => UNKNOWN,

        (Context::Dinf, b"dref") => Recipe::full("Data Reference Box", K::Dref),
        (Context::Dinf, _) => UNKNOWN,

        (Context::Dref, b"url ") => Recipe::full("Data Entry URL Box", K::DataEntryUrl),
        (Context::Dref, _) => Recipe::new("Data Entry", true, Dispatch::Unsupported),

        (Context::Stbl, b"stsd") => Recipe::full("Sample Description Box", K::Stsd),
        (Context::Stbl, b"stco") => Recipe::full("Chunk Offset Box", K::Stco),
        (Context::Stbl, b"co64") => Recipe::full("64-bit Chunk Offset Box", K::Co64),
        (Context::Stbl, _) => UNKNOWN,

        (Context::Stsd, b"av01") => Recipe::body("AV1 Sample Entry", K::Av01SampleEntry),
        (Context::Stsd, _) => UNKNOWN,

        (Context::SampleEntry, b"av1C") => Recipe::body("AV1 Codec Configuration Box", K::Av1C),
        (Context::SampleEntry, b"ccst") => Recipe::full("Coding Constraints Box", K::Ccst),
        (Context::SampleEntry, b"auxi") => Recipe::full("Auxiliary Type Info Box", K::Auxi),
        (Context::SampleEntry, _) => UNKNOWN,
    }
}
