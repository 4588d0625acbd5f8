//! Object metadata and the lookups the compiler performs against it.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde::Deserialize;

/// Object API name to object metadata.
pub type ObjectInfoMap = IndexMap<String, ObjectInfo>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub api_name: String,
    #[serde(default)]
    pub fields: IndexMap<String, FieldInfo>,
    #[serde(default)]
    pub child_relationships: IndexMap<String, RelationshipInfo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "fieldType")]
pub enum FieldInfo {
    Scalar(ScalarFieldInfo),
    Reference(ReferenceFieldInfo),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalarFieldInfo {
    pub api_name: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceFieldInfo {
    pub api_name: String,
    pub relationship_name: String,
    pub reference_to_api_name: String,
}

/// A one-to-many edge: `field_name` on the child points back at the parent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipInfo {
    pub field_name: String,
    pub child_object_api_name: String,
    pub relationship_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DataType {
    Boolean,
    String,
    Double,
    Int,
    Id,
    Time,
    Date,
    DateTime,
    Currency,
    Percent,
    Picklist,
    Email,
    Phone,
    Url,
    TextArea,
}

/// Coarse classification of a field for filter operator legality and literal coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Boolean,
    Text,
    Id,
    Reference,
    Int,
    Double,
    Time,
    Date,
    DateTime,
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            FilterKind::Boolean => "Boolean",
            FilterKind::Text => "String",
            FilterKind::Id => "Id",
            FilterKind::Reference => "Reference",
            FilterKind::Int => "Int",
            FilterKind::Double => "Double",
            FilterKind::Time => "Time",
            FilterKind::Date => "Date",
            FilterKind::DateTime => "DateTime",
        };
        write!(f, "{}", name)
    }
}

impl DataType {
    pub fn filter_kind(self) -> FilterKind {
        match self {
            DataType::Boolean => FilterKind::Boolean,
            DataType::String
            | DataType::Picklist
            | DataType::Email
            | DataType::Phone
            | DataType::Url
            | DataType::TextArea => FilterKind::Text,
            DataType::Id => FilterKind::Id,
            DataType::Int => FilterKind::Int,
            DataType::Double | DataType::Currency | DataType::Percent => FilterKind::Double,
            DataType::Time => FilterKind::Time,
            DataType::Date => FilterKind::Date,
            DataType::DateTime => FilterKind::DateTime,
        }
    }
}

impl FieldInfo {
    pub fn api_name(&self) -> &str {
        match self {
            FieldInfo::Scalar(info) => &info.api_name,
            FieldInfo::Reference(info) => &info.api_name,
        }
    }

    pub fn filter_kind(&self) -> FilterKind {
        match self {
            FieldInfo::Scalar(info) => info.data_type.filter_kind(),
            FieldInfo::Reference(_) => FilterKind::Reference,
        }
    }

    /// The reference this field spans when selected by `name`, if any.
    pub fn spanning(&self, name: &str) -> Option<&ReferenceFieldInfo> {
        match self {
            FieldInfo::Reference(info) if info.relationship_name == name => Some(info),
            _ => None,
        }
    }
}

pub const ID_FIELD: &str = "Id";
pub const API_NAME_FIELD: &str = "ApiName";

lazy_static! {
    static ref INTRINSIC_ID: FieldInfo = FieldInfo::Scalar(ScalarFieldInfo {
        api_name: ID_FIELD.to_string(),
        data_type: DataType::Id,
    });
    static ref INTRINSIC_API_NAME: FieldInfo = FieldInfo::Scalar(ScalarFieldInfo {
        api_name: API_NAME_FIELD.to_string(),
        data_type: DataType::String,
    });
}

/// Whether `field_name` is one of the fields stored outside `data.fields`.
pub fn is_intrinsic_field(field_name: &str) -> bool {
    field_name == ID_FIELD || field_name == API_NAME_FIELD
}

/// Looks up a field by API name, or by relationship name for reference fields.
///
/// Every record carries `Id` and `ApiName`, so those resolve for any known
/// object type even when its metadata does not declare them.
pub fn get_field_info<'s>(
    api_name: &str,
    field_name: &str,
    schema: &'s ObjectInfoMap,
) -> Option<&'s FieldInfo> {
    let object_info = schema.get(api_name)?;
    object_info
        .fields
        .values()
        .find(|field| match field {
            FieldInfo::Scalar(info) => info.api_name == field_name,
            FieldInfo::Reference(info) => {
                info.api_name == field_name || info.relationship_name == field_name
            }
        })
        .or_else(|| match field_name {
            ID_FIELD => Some(&*INTRINSIC_ID),
            API_NAME_FIELD => Some(&*INTRINSIC_API_NAME),
            _ => None,
        })
}

pub fn get_relationship_info<'s>(
    api_name: &str,
    field_name: &str,
    schema: &'s ObjectInfoMap,
) -> Option<&'s RelationshipInfo> {
    schema
        .get(api_name)?
        .child_relationships
        .values()
        .find(|relationship| relationship.relationship_name == field_name)
}

/// Which leaf of a UI API field value to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLeaf {
    Value,
    DisplayValue,
}

impl FieldLeaf {
    pub fn from_selection(name: &str) -> Option<FieldLeaf> {
        match name {
            "value" => Some(FieldLeaf::Value),
            "displayValue" => Some(FieldLeaf::DisplayValue),
            _ => None,
        }
    }
}

/// JSON path (without the leading `$.`) of a field inside a stored record.
pub fn field_path(field_name: &str, leaf: FieldLeaf) -> String {
    match (field_name, leaf) {
        (ID_FIELD, _) => "data.id".to_string(),
        (API_NAME_FIELD, _) => "data.apiName".to_string(),
        (name, FieldLeaf::Value) => format!("data.fields.{}.value", name),
        (name, FieldLeaf::DisplayValue) => format!("data.fields.{}.displayValue", name),
    }
}
