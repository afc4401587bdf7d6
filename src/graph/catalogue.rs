use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Semantic output type of a node port (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum OutputType {
    Series,
    BoolSeries,
    Signal,
    OrderBatch,
    Scalar,
}

/// Comparison operator, canonical symbol form (spec I5).
///
/// `FromStr` accepts both the canonical symbol and every textual synonym an
/// LLM might emit; `Display` always renders the canonical symbol, so parsing
/// a node's params through this type *is* the I5 rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
pub enum ComparisonOp {
    #[strum(to_string = "<", serialize = "<", serialize = "lt", serialize = "less_than")]
    Lt,
    #[strum(to_string = "<=", serialize = "<=", serialize = "le")]
    Le,
    #[strum(to_string = ">", serialize = ">", serialize = "gt", serialize = "greater_than")]
    Gt,
    #[strum(to_string = ">=", serialize = ">=", serialize = "ge")]
    Ge,
    #[strum(to_string = "==", serialize = "==", serialize = "eq")]
    Eq,
    #[strum(to_string = "!=", serialize = "!=", serialize = "ne")]
    Ne,
    #[strum(
        to_string = "cross_up",
        serialize = "cross_up",
        serialize = "crosses_above"
    )]
    CrossUp,
    #[strum(
        to_string = "cross_down",
        serialize = "cross_down",
        serialize = "crosses_below"
    )]
    CrossDown,
}

/// The closed set of node kinds (spec §3 node catalogue). Adding a node is
/// additive here; the executor dispatches on this tag, never reflectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "PascalCase", ascii_case_insensitive)]
pub enum NodeKind {
    MarketData,
    Sma,
    Ema,
    Rsi,
    Atr,
    Constant,
    Compare,
    EntrySignal,
    ExitSignal,
    StopLossFixed,
    StopLossAtr,
    TakeProfitFixed,
    TakeProfitAtr,
    PositionSizingFixed,
    BracketOrder,
    RiskManagerDaily,
    SessionTimeFilter,
}

/// Declares one input or output port: a name and its semantic type.
pub struct PortDecl {
    pub name: &'static str,
    pub ty: OutputType,
}

/// Declares one parameter: a name and whether a schema default exists.
pub struct ParamDecl {
    pub name: &'static str,
    pub required: bool,
}

impl NodeKind {
    /// Input ports this node kind consumes.
    pub fn input_ports(&self) -> &'static [PortDecl] {
        use OutputType::*;
        match self {
            NodeKind::MarketData => &[],
            NodeKind::Sma | NodeKind::Ema | NodeKind::Rsi => {
                &[PortDecl { name: "source", ty: Series }]
            }
            NodeKind::Atr => &[PortDecl { name: "source", ty: Series }],
            NodeKind::Constant => &[],
            NodeKind::Compare => &[
                PortDecl { name: "lhs", ty: Series },
                PortDecl { name: "rhs", ty: Series },
            ],
            NodeKind::EntrySignal | NodeKind::ExitSignal => {
                &[PortDecl { name: "condition", ty: BoolSeries }]
            }
            NodeKind::StopLossFixed | NodeKind::TakeProfitFixed => &[],
            NodeKind::StopLossAtr | NodeKind::TakeProfitAtr => {
                &[PortDecl { name: "atr", ty: Series }]
            }
            NodeKind::PositionSizingFixed => &[],
            NodeKind::BracketOrder => &[
                PortDecl { name: "entry", ty: Signal },
                PortDecl { name: "exit", ty: Signal },
                PortDecl { name: "stop_loss", ty: Scalar },
                PortDecl { name: "take_profit", ty: Scalar },
                PortDecl { name: "size", ty: Scalar },
            ],
            NodeKind::RiskManagerDaily => &[PortDecl { name: "orders", ty: OrderBatch }],
            NodeKind::SessionTimeFilter => &[PortDecl { name: "orders", ty: OrderBatch }],
        }
    }

    /// Output ports this node kind produces.
    pub fn output_ports(&self) -> &'static [PortDecl] {
        use OutputType::*;
        match self {
            NodeKind::MarketData => &[
                PortDecl { name: "open", ty: Series },
                PortDecl { name: "high", ty: Series },
                PortDecl { name: "low", ty: Series },
                PortDecl { name: "close", ty: Series },
                PortDecl { name: "volume", ty: Series },
            ],
            NodeKind::Sma | NodeKind::Ema | NodeKind::Rsi | NodeKind::Atr => {
                &[PortDecl { name: "value", ty: Series }]
            }
            NodeKind::Constant => &[PortDecl { name: "value", ty: Scalar }],
            NodeKind::Compare => &[PortDecl { name: "value", ty: BoolSeries }],
            NodeKind::EntrySignal | NodeKind::ExitSignal => {
                &[PortDecl { name: "value", ty: Signal }]
            }
            NodeKind::StopLossFixed
            | NodeKind::StopLossAtr
            | NodeKind::TakeProfitFixed
            | NodeKind::TakeProfitAtr => &[PortDecl { name: "offset", ty: Scalar }],
            NodeKind::PositionSizingFixed => &[PortDecl { name: "size", ty: Scalar }],
            NodeKind::BracketOrder | NodeKind::RiskManagerDaily | NodeKind::SessionTimeFilter => {
                &[PortDecl { name: "orders", ty: OrderBatch }]
            }
        }
    }

    /// Declared parameter schema, used by the LLM normalization pipeline to
    /// inject missing defaults (spec §4.6 step 3).
    pub fn param_schema(&self) -> &'static [ParamDecl] {
        match self {
            NodeKind::MarketData => &[ParamDecl { name: "symbol", required: true }],
            NodeKind::Sma | NodeKind::Ema | NodeKind::Rsi => {
                &[ParamDecl { name: "period", required: true }]
            }
            NodeKind::Atr => &[ParamDecl { name: "period", required: true }],
            NodeKind::Constant => &[ParamDecl { name: "value", required: true }],
            NodeKind::Compare => &[ParamDecl { name: "op", required: true }],
            NodeKind::EntrySignal | NodeKind::ExitSignal => &[],
            NodeKind::StopLossFixed | NodeKind::TakeProfitFixed => {
                &[ParamDecl { name: "offset", required: true }]
            }
            NodeKind::StopLossAtr | NodeKind::TakeProfitAtr => {
                &[ParamDecl { name: "multiple", required: true }]
            }
            NodeKind::PositionSizingFixed => &[ParamDecl { name: "dollars", required: true }],
            NodeKind::BracketOrder => &[],
            NodeKind::RiskManagerDaily => &[
                ParamDecl { name: "max_trades", required: false },
                ParamDecl { name: "max_loss_pct", required: false },
                ParamDecl { name: "max_profit_pct", required: false },
            ],
            NodeKind::SessionTimeFilter => &[
                ParamDecl { name: "start_hour", required: true },
                ParamDecl { name: "end_hour", required: true },
                ParamDecl { name: "tz", required: false },
            ],
        }
    }

    /// Whether this kind can serve as the graph's terminal order-emitting node (I4).
    pub fn is_terminal_order_node(&self) -> bool {
        matches!(self, NodeKind::BracketOrder)
    }

    pub fn is_market_data_source(&self) -> bool {
        matches!(self, NodeKind::MarketData)
    }
}
