//! Entity types.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::constraint::ConstraintDecl;

/// A record type stored and validated by the DAO.
///
/// Records travel as JSON documents. A type inherits another type's
/// markers by chaining its `declarations()`:
///
/// ```
/// use ruledao_core::{BoundedCountDecl, ConstraintDecl, Entity};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Country {
///     id: Option<i64>,
///     designation: String,
/// }
///
/// impl Entity for Country {
///     const NAME: &'static str = "Country";
///
///     fn declarations() -> Vec<ConstraintDecl> {
///         vec![BoundedCountDecl::new(
///             "find Country where designation = ${designation}",
///             "country.duplicate_designation",
///         )
///         .max(0)
///         .into()]
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned {
    /// Entity type name, used as the store namespace and in query text.
    const NAME: &'static str;

    /// Property holding the record id.
    const ID_FIELD: &'static str = "id";

    /// Class-level constraint declarations, in evaluation order.
    fn declarations() -> Vec<ConstraintDecl> {
        Vec::new()
    }
}
