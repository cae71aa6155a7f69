//! Tables and columns of the search index schema.

// Constant names mirror the physical column names
#![allow(missing_docs)]

use super::{Collation, Column, SqlType, Table};

const DECIMAL: SqlType = SqlType::Decimal {
    precision: 36,
    scale: 18,
};

/// The resource table.
pub mod resource {
    use super::*;

    pub const TABLE: Table = Table {
        name: "dbo.Resource",
        type_scan_index: Some("IX_Resource_ResourceTypeId_ResourceSurrogateId"),
    };

    pub const RESOURCE_TYPE_ID: Column = Column::new("ResourceTypeId", SqlType::SmallInt);
    pub const RESOURCE_ID: Column = Column::new("ResourceId", SqlType::VarChar)
        .max_length(64)
        .collation(Collation::CaseSensitive);
    pub const VERSION: Column = Column::new("Version", SqlType::Int);
    pub const IS_HISTORY: Column = Column::new("IsHistory", SqlType::Bit);
    pub const RESOURCE_SURROGATE_ID: Column = Column::new("ResourceSurrogateId", SqlType::BigInt);
    pub const IS_DELETED: Column = Column::new("IsDeleted", SqlType::Bit);
    pub const REQUEST_METHOD: Column = Column::new("RequestMethod", SqlType::VarChar)
        .max_length(10)
        .nullable();
    pub const RAW_RESOURCE: Column = Column::new("RawResource", SqlType::VarBinary);
    pub const IS_RAW_RESOURCE_META_SET: Column =
        Column::new("IsRawResourceMetaSet", SqlType::Bit);
    pub const SEARCH_PARAM_HASH: Column = Column::new("SearchParamHash", SqlType::VarChar)
        .max_length(64)
        .nullable();
}

/// Columns shared by every search parameter index table.
pub mod search_param {
    use super::*;

    pub const RESOURCE_TYPE_ID: Column = Column::new("ResourceTypeId", SqlType::SmallInt);
    pub const RESOURCE_SURROGATE_ID: Column = Column::new("ResourceSurrogateId", SqlType::BigInt);
    pub const SEARCH_PARAM_ID: Column = Column::new("SearchParamId", SqlType::SmallInt);
}

pub mod string_search_param {
    use super::*;

    pub const TABLE: Table = Table {
        name: "dbo.StringSearchParam",
        type_scan_index: None,
    };

    /// First 256 characters of the value.
    pub const TEXT: Column = Column::new("Text", SqlType::NVarChar)
        .max_length(256)
        .collation(Collation::CaseInsensitive);
    /// The full value when it does not fit in [`TEXT`].
    pub const TEXT_OVERFLOW: Column = Column::new("TextOverflow", SqlType::NVarChar)
        .nullable()
        .collation(Collation::CaseInsensitive);
    pub const IS_MIN: Column = Column::new("IsMin", SqlType::Bit);
    pub const IS_MAX: Column = Column::new("IsMax", SqlType::Bit);
}

pub mod token_search_param {
    use super::*;

    pub const TABLE: Table = Table {
        name: "dbo.TokenSearchParam",
        type_scan_index: None,
    };

    pub const SYSTEM_ID: Column = Column::new("SystemId", SqlType::Int).nullable();
    /// First 256 characters of the code.
    pub const CODE: Column = Column::new("Code", SqlType::VarChar)
        .max_length(256)
        .collation(Collation::CaseSensitive);
    /// The characters of the code beyond [`CODE`]'s length.
    pub const CODE_OVERFLOW: Column = Column::new("CodeOverflow", SqlType::VarChar)
        .nullable()
        .collation(Collation::CaseSensitive);
}

pub mod token_text {
    use super::*;

    pub const TABLE: Table = Table {
        name: "dbo.TokenText",
        type_scan_index: None,
    };

    pub const TEXT: Column = Column::new("Text", SqlType::NVarChar)
        .max_length(400)
        .collation(Collation::CaseInsensitive);
}

pub mod uri_search_param {
    use super::*;

    pub const TABLE: Table = Table {
        name: "dbo.UriSearchParam",
        type_scan_index: None,
    };

    pub const URI: Column = Column::new("Uri", SqlType::VarChar)
        .max_length(256)
        .collation(Collation::CaseSensitive);
}

pub mod number_search_param {
    use super::*;

    pub const TABLE: Table = Table {
        name: "dbo.NumberSearchParam",
        type_scan_index: None,
    };

    pub const SINGLE_VALUE: Column = Column::new("SingleValue", DECIMAL).nullable();
    pub const LOW_VALUE: Column = Column::new("LowValue", DECIMAL).nullable();
    pub const HIGH_VALUE: Column = Column::new("HighValue", DECIMAL).nullable();
}

pub mod quantity_search_param {
    use super::*;

    pub const TABLE: Table = Table {
        name: "dbo.QuantitySearchParam",
        type_scan_index: None,
    };

    pub const SYSTEM_ID: Column = Column::new("SystemId", SqlType::Int).nullable();
    pub const QUANTITY_CODE_ID: Column = Column::new("QuantityCodeId", SqlType::Int).nullable();
    pub const SINGLE_VALUE: Column = Column::new("SingleValue", DECIMAL).nullable();
    pub const LOW_VALUE: Column = Column::new("LowValue", DECIMAL).nullable();
    pub const HIGH_VALUE: Column = Column::new("HighValue", DECIMAL).nullable();
}

pub mod date_time_search_param {
    use super::*;

    pub const TABLE: Table = Table {
        name: "dbo.DateTimeSearchParam",
        type_scan_index: None,
    };

    pub const START_DATE_TIME: Column = Column::new("StartDateTime", SqlType::DateTime2);
    pub const END_DATE_TIME: Column = Column::new("EndDateTime", SqlType::DateTime2);
    pub const IS_LONGER_THAN_A_DAY: Column = Column::new("IsLongerThanADay", SqlType::Bit);
    pub const IS_MIN: Column = Column::new("IsMin", SqlType::Bit);
    pub const IS_MAX: Column = Column::new("IsMax", SqlType::Bit);
}

pub mod reference_search_param {
    use super::*;

    pub const TABLE: Table = Table {
        name: "dbo.ReferenceSearchParam",
        type_scan_index: None,
    };

    pub const BASE_URI: Column = Column::new("BaseUri", SqlType::VarChar)
        .max_length(128)
        .nullable()
        .collation(Collation::CaseSensitive);
    pub const REFERENCE_RESOURCE_TYPE_ID: Column =
        Column::new("ReferenceResourceTypeId", SqlType::SmallInt).nullable();
    pub const REFERENCE_RESOURCE_ID: Column = Column::new("ReferenceResourceId", SqlType::VarChar)
        .max_length(64)
        .collation(Collation::CaseSensitive);
    pub const REFERENCE_RESOURCE_VERSION: Column =
        Column::new("ReferenceResourceVersion", SqlType::Int).nullable();
}

pub mod compartment_assignment {
    use super::*;

    pub const TABLE: Table = Table {
        name: "dbo.CompartmentAssignment",
        type_scan_index: None,
    };

    pub const COMPARTMENT_TYPE_ID: Column = Column::new("CompartmentTypeId", SqlType::TinyInt);
    pub const REFERENCE_RESOURCE_ID: Column = Column::new("ReferenceResourceId", SqlType::VarChar)
        .max_length(64)
        .collation(Collation::CaseSensitive);
}

/// Interned token and quantity systems.
pub mod system {
    use super::*;

    pub const TABLE: Table = Table {
        name: "dbo.System",
        type_scan_index: None,
    };

    pub const SYSTEM_ID: Column = Column::new("SystemId", SqlType::Int);
    pub const VALUE: Column = Column::new("Value", SqlType::NVarChar)
        .max_length(256)
        .collation(Collation::CaseSensitive);
}

/// Interned quantity codes.
pub mod quantity_code {
    use super::*;

    pub const TABLE: Table = Table {
        name: "dbo.QuantityCode",
        type_scan_index: None,
    };

    pub const QUANTITY_CODE_ID: Column = Column::new("QuantityCodeId", SqlType::Int);
    pub const VALUE: Column = Column::new("Value", SqlType::NVarChar)
        .max_length(256)
        .collation(Collation::CaseSensitive);
}

/// `identifier:of-type` index: the identifier type coding plus its value.
pub mod identifier_of_type_search_param {
    use super::*;

    pub const TABLE: Table = Table {
        name: "dbo.IdentifierOfTypeSearchParam",
        type_scan_index: None,
    };

    pub const SYSTEM_ID: Column = Column::new("SystemId", SqlType::Int).nullable();
    pub const CODE: Column = Column::new("Code", SqlType::VarChar)
        .max_length(256)
        .collation(Collation::CaseSensitive);
    pub const CODE_OVERFLOW: Column = Column::new("CodeOverflow", SqlType::VarChar)
        .nullable()
        .collation(Collation::CaseSensitive);
    pub const IDENTIFIER_VALUE: Column = Column::new("IdentifierValue", SqlType::VarChar)
        .max_length(256)
        .collation(Collation::CaseSensitive);
}

/// Composite tables. Their columns reuse the component tables' metadata with
/// the component number appended to the name (`Code1`, `SingleValue2`, ...).
pub mod composites {
    use super::*;

    pub const TOKEN_TOKEN: Table = Table {
        name: "dbo.TokenTokenCompositeSearchParam",
        type_scan_index: None,
    };
    pub const TOKEN_DATE_TIME: Table = Table {
        name: "dbo.TokenDateTimeCompositeSearchParam",
        type_scan_index: None,
    };
    pub const TOKEN_QUANTITY: Table = Table {
        name: "dbo.TokenQuantityCompositeSearchParam",
        type_scan_index: None,
    };
    pub const TOKEN_STRING: Table = Table {
        name: "dbo.TokenStringCompositeSearchParam",
        type_scan_index: None,
    };
    pub const TOKEN_NUMBER_NUMBER: Table = Table {
        name: "dbo.TokenNumberNumberCompositeSearchParam",
        type_scan_index: None,
    };
    pub const REFERENCE_TOKEN: Table = Table {
        name: "dbo.ReferenceTokenCompositeSearchParam",
        type_scan_index: None,
    };
}
