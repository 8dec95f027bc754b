//! State component values
//!
//! Each orthogonal aspect of GPU pipeline state is one [`StateValue`]
//! variant. Values are plain data, compared by value; floats are compared
//! bitwise so equality stays reflexive and hashable.

use core::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};
use void_core::Identifier;

use crate::batch::{CommandSink, RenderCommand};

/// Kind tag of a state component
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    Blend,
    Depth,
    Cull,
    Scissor,
    Stencil,
    Viewport,
    ColorMask,
    PolygonOffset,
    PolygonMode,
    LogicOp,
}

/// Blend factor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Blend equation operator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// One blend equation (color or alpha)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlendComponent {
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub op: BlendOp,
}

impl BlendComponent {
    /// `src * 1 + dst * 0`
    pub const REPLACE: Self = Self {
        src: BlendFactor::One,
        dst: BlendFactor::Zero,
        op: BlendOp::Add,
    };
}

/// Blend state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlendState {
    pub enabled: bool,
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendState {
    /// Blending off
    pub const DISABLED: Self = Self {
        enabled: false,
        color: BlendComponent::REPLACE,
        alpha: BlendComponent::REPLACE,
    };

    /// Classic straight-alpha blending
    pub const ALPHA: Self = Self {
        enabled: true,
        color: BlendComponent {
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::OneMinusSrcAlpha,
            op: BlendOp::Add,
        },
        alpha: BlendComponent {
            src: BlendFactor::One,
            dst: BlendFactor::OneMinusSrcAlpha,
            op: BlendOp::Add,
        },
    };

    /// Additive blending
    pub const ADDITIVE: Self = Self {
        enabled: true,
        color: BlendComponent {
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::One,
            op: BlendOp::Add,
        },
        alpha: BlendComponent {
            src: BlendFactor::One,
            dst: BlendFactor::One,
            op: BlendOp::Add,
        },
    };
}

/// Comparison function for depth and stencil tests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Depth test state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare: CompareFunction,
}

impl DepthState {
    pub const DISABLED: Self = Self {
        test: false,
        write: false,
        compare: CompareFunction::Always,
    };

    pub const LESS_EQUAL: Self = Self {
        test: true,
        write: true,
        compare: CompareFunction::LessEqual,
    };

    /// Test without writing (translucent geometry)
    pub const READ_ONLY: Self = Self {
        test: true,
        write: false,
        compare: CompareFunction::LessEqual,
    };
}

/// Faces to cull
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Winding of front faces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrontFace {
    Ccw,
    Cw,
}

/// Face culling state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CullState {
    pub mode: CullMode,
    pub front_face: FrontFace,
}

impl CullState {
    pub const NONE: Self = Self {
        mode: CullMode::None,
        front_face: FrontFace::Ccw,
    };

    pub const BACK: Self = Self {
        mode: CullMode::Back,
        front_face: FrontFace::Ccw,
    };
}

/// Scissor test
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScissorState {
    Disabled,
    Rect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
}

/// Stencil operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

/// Per-face stencil configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StencilFaceState {
    pub compare: CompareFunction,
    pub fail_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub pass_op: StencilOp,
}

impl StencilFaceState {
    pub const IGNORE: Self = Self {
        compare: CompareFunction::Always,
        fail_op: StencilOp::Keep,
        depth_fail_op: StencilOp::Keep,
        pass_op: StencilOp::Keep,
    };
}

/// Stencil state, captured single-sided
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StencilState {
    pub enabled: bool,
    pub face: StencilFaceState,
    pub reference: u32,
    pub read_mask: u32,
    pub write_mask: u32,
}

impl StencilState {
    pub const DISABLED: Self = Self {
        enabled: false,
        face: StencilFaceState::IGNORE,
        reference: 0,
        read_mask: 0xff,
        write_mask: 0xff,
    };

    /// Capture from separate front and back face configuration.
    ///
    /// This representation is single-sided: when the faces differ the front
    /// face is kept and the back face is dropped (lossy).
    pub fn from_faces(
        enabled: bool,
        front: StencilFaceState,
        back: StencilFaceState,
        reference: u32,
        read_mask: u32,
        write_mask: u32,
    ) -> Self {
        if front != back {
            log::debug!(
                "Stencil faces differ (front {:?}, back {:?}); keeping front face only",
                front,
                back
            );
        }

        Self {
            enabled,
            face: front,
            reference,
            read_mask,
            write_mask,
        }
    }
}

/// Viewport rectangle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewportState {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ViewportState {
    /// Zero-size viewport meaning "use the full target"
    pub const FULL_TARGET: Self = Self {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    };
}

/// Color write mask
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorMask {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl ColorMask {
    pub const ALL: Self = Self { r: true, g: true, b: true, a: true };
    pub const NONE: Self = Self { r: false, g: false, b: false, a: false };
    pub const COLOR: Self = Self { r: true, g: true, b: true, a: false };
}

/// Depth bias
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PolygonOffset {
    pub enabled: bool,
    pub factor: f32,
    pub units: f32,
}

impl PolygonOffset {
    pub const DISABLED: Self = Self {
        enabled: false,
        factor: 0.0,
        units: 0.0,
    };

    /// Enabled offset
    pub fn new(factor: f32, units: f32) -> Self {
        Self {
            enabled: true,
            factor,
            units,
        }
    }
}

impl PartialEq for PolygonOffset {
    fn eq(&self, other: &Self) -> bool {
        self.enabled == other.enabled
            && self.factor.to_bits() == other.factor.to_bits()
            && self.units.to_bits() == other.units.to_bits()
    }
}

impl Eq for PolygonOffset {}

impl Hash for PolygonOffset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.enabled.hash(state);
        self.factor.to_bits().hash(state);
        self.units.to_bits().hash(state);
    }
}

/// Rasterization fill mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolygonMode {
    Fill,
    Line,
    Point,
}

impl PolygonMode {
    /// Capture from separate front/back modes. Single-sided: the front mode
    /// wins when they differ (lossy).
    pub fn from_faces(front: PolygonMode, back: PolygonMode) -> Self {
        if front != back {
            log::debug!(
                "Polygon modes differ (front {:?}, back {:?}); keeping front mode only",
                front,
                back
            );
        }
        front
    }
}

/// Framebuffer logic operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicOp {
    Disabled,
    Clear,
    Set,
    Copy,
    CopyInverted,
    Invert,
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Equiv,
}

/// Value of one state component slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateValue {
    Blend(BlendState),
    Depth(DepthState),
    Cull(CullState),
    Scissor(ScissorState),
    Stencil(StencilState),
    Viewport(ViewportState),
    ColorMask(ColorMask),
    PolygonOffset(PolygonOffset),
    PolygonMode(PolygonMode),
    LogicOp(LogicOp),
}

impl StateValue {
    /// Kind tag of this value
    pub fn kind(&self) -> StateKind {
        match self {
            StateValue::Blend(_) => StateKind::Blend,
            StateValue::Depth(_) => StateKind::Depth,
            StateValue::Cull(_) => StateKind::Cull,
            StateValue::Scissor(_) => StateKind::Scissor,
            StateValue::Stencil(_) => StateKind::Stencil,
            StateValue::Viewport(_) => StateKind::Viewport,
            StateValue::ColorMask(_) => StateKind::ColorMask,
            StateValue::PolygonOffset(_) => StateKind::PolygonOffset,
            StateValue::PolygonMode(_) => StateKind::PolygonMode,
            StateValue::LogicOp(_) => StateKind::LogicOp,
        }
    }

    /// Emit the backend operation that makes this value current
    pub fn apply(&self, slot: &Identifier, sink: &mut dyn CommandSink) {
        sink.submit(RenderCommand::ApplyState {
            slot: slot.clone(),
            value: *self,
        });
    }
}
