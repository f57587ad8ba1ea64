//! Error types for operations that can be rejected by the engine.

/// Errors from constructing a shape with invalid geometry.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("A polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),
    #[error("A polygon can have at most {max} vertices, got {count}")]
    TooManyVertices { count: usize, max: usize },
    #[error("A chain needs at least 2 vertices, got {0}")]
    TooFewChainVertices(usize),
    #[error("Edge {0} of the shape has zero length")]
    DegenerateEdge(usize),
    #[error("The polygon is not convex")]
    NotConvex,
    #[error("Expected a positive {what}, got {value}")]
    NonPositive { what: &'static str, value: f64 },
    #[error("Expected a finite {what}, got {value}")]
    NotFinite { what: &'static str, value: f64 },
}

/// Errors from operations on a [`PhysicsWorld`][crate::PhysicsWorld].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("The body does not exist")]
    NoSuchBody,
    #[error("The body has been removed and will be destroyed at the next step")]
    BodyDisposed,
    #[error("A joint cannot connect a body to itself")]
    SelfJoint,
    #[error("The broad phase cannot be replaced while fixtures exist")]
    BroadPhaseInUse,
    #[error("Invalid shape")]
    Shape(#[from] ShapeError),
    #[error("Expected a positive {what}, got {value}")]
    NonPositive { what: &'static str, value: f64 },
}

/// Check that a value is finite and greater than zero.
pub(crate) fn check_positive(what: &'static str, value: f64) -> Result<f64, ShapeError> {
    if !value.is_finite() {
        Err(ShapeError::NotFinite { what, value })
    } else if value <= 0.0 {
        Err(ShapeError::NonPositive { what, value })
    } else {
        Ok(value)
    }
}
