//! Element metadata
//!
//! Every element of a publication carries a metadata record describing what
//! the value means (layer, nature, semantic role) and how the bus should
//! treat it (priority, retention, scope). Metadata is immutable once the
//! element is announced; changing it requires adding a new element or
//! re-announcing a new schema version.
//!
//! All enums are wire-stable u8 discriminants.

macro_rules! wire_enum {
    (
        $(#[$outer:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = $disc:expr => $label:expr,)+ }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $disc,)+
        }

        impl $name {
            /// Parse from the wire discriminant
            #[inline]
            pub const fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($disc => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Convert to the wire discriminant
            #[inline]
            pub const fn as_u8(self) -> u8 {
                self as u8
            }

            /// Get the string name
            #[inline]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

wire_enum! {
    /// Which layer of the stack produced this element
    Layer {
        #[default]
        App = 0 => "app",
        Os = 1 => "os",
        Lib = 2 => "lib",
        Flow = 3 => "flow",
        Control = 4 => "control",
    }
}

wire_enum! {
    /// What role the observed activity plays in the workload
    Nature {
        #[default]
        Default = 0 => "default",
        CreateInput = 1 => "create_input",
        CreateOutput = 2 => "create_output",
        CreateViz = 3 => "create_viz",
        ExecWork = 4 => "exec_work",
        Buffer = 5 => "buffer",
        SupportExec = 6 => "support_exec",
        SupportFlow = 7 => "support_flow",
        ControlFlow = 8 => "control_flow",
        Sos = 9 => "sos",
    }
}

wire_enum! {
    /// Semantic hint for time-series consumers
    Semantic {
        #[default]
        Default = 0 => "default",
        TimeStart = 1 => "time_start",
        TimeStop = 2 => "time_stop",
        TimeStamp = 3 => "time_stamp",
        TimeSpan = 4 => "time_span",
        ValCurrent = 5 => "val_current",
        ValCounter = 6 => "val_counter",
    }
}

wire_enum! {
    /// Whether the element is sampled state or a discrete event
    Class {
        #[default]
        Data = 0 => "data",
        Event = 1 => "event",
    }
}

wire_enum! {
    /// Transport priority; affects overflow eviction, not in-queue order
    Priority {
        #[default]
        Default = 0 => "default",
        Low = 1 => "low",
        Immediate = 2 => "immediate",
    }
}

wire_enum! {
    /// How long downstream should retain this value
    Retention {
        #[default]
        Default = 0 => "default",
        Session = 1 => "session",
        Immediate = 2 => "immediate",
    }
}

wire_enum! {
    /// How far the value should propagate
    Scope {
        #[default]
        Default = 0 => "default",
        SelfOnly = 1 => "self",
        Node = 2 => "node",
        Enclave = 3 => "enclave",
    }
}

/// Metadata record for one publication element
///
/// Immutable after announce. The `pattern` string is a free-form unit or
/// format hint ("ms", "bytes/s", a printf pattern) passed through to
/// consumers untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub layer: Layer,
    pub nature: Nature,
    pub semantic: Semantic,
    pub class: Class,
    pub priority: Priority,
    pub retention: Retention,
    pub scope: Scope,
    pub pattern: String,
}

impl Metadata {
    /// Metadata with all-default descriptors
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style layer override
    pub fn layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    /// Builder-style nature override
    pub fn nature(mut self, nature: Nature) -> Self {
        self.nature = nature;
        self
    }

    /// Builder-style semantic override
    pub fn semantic(mut self, semantic: Semantic) -> Self {
        self.semantic = semantic;
        self
    }

    /// Builder-style class override
    pub fn class(mut self, class: Class) -> Self {
        self.class = class;
        self
    }

    /// Builder-style priority override
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder-style retention override
    pub fn retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    /// Builder-style scope override
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Builder-style unit/pattern hint
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }
}
