mod decompose;
mod hyde;
mod scripted;

pub use decompose::{
    decompose_query, is_multi_part, Decomposer, HeuristicDecomposer, ModelDecomposer,
    DEFAULT_MAX_SUBQUERIES,
};
pub use hyde::{HydeRewriter, QueryVector, VectorOrigin, DEFAULT_HYDE_THRESHOLD};
pub use scripted::ScriptedGenerator;
