/// Error code registry for merge-csv
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Source (input) errors
/// - 3000-3999: Merge errors
/// - 4000-4999: Destination (output) errors
/// - 5000-5999: Workflow errors
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_YAML: u16 = 1002;
    pub const CONFIG_INVALID_VALUE: u16 = 1005;

    // Source errors (2000-2999)
    pub const SOURCE_UNAVAILABLE: u16 = 2001;
    pub const SOURCE_PERMISSION_DENIED: u16 = 2002;
    pub const SOURCE_MALFORMED: u16 = 2010;
    pub const SOURCE_EMPTY: u16 = 2011;
    pub const SOURCE_RAGGED_RECORD: u16 = 2012;
    pub const SOURCE_INVALID_UTF8: u16 = 2013;
    pub const SOURCE_DUPLICATE_HEADER: u16 = 2014;
    pub const SOURCE_INVALID_JSON: u16 = 2015;

    // Merge errors (3000-3999)
    pub const MERGE_KEY_COLUMN_MISSING: u16 = 3001;

    // Destination errors (4000-4999)
    pub const DEST_UNWRITABLE: u16 = 4001;
    pub const DEST_PARENT_MISSING: u16 = 4002;
    pub const DEST_PERMISSION_DENIED: u16 = 4003;

    // Workflow errors (5000-5999)
    pub const WORKFLOW_GENERIC: u16 = 5000;
    pub const WORKFLOW_UPSTREAM_FAILED: u16 = 5007;
    pub const WORKFLOW_CIRCULAR_DEPENDENCY: u16 = 5010;
    pub const WORKFLOW_UNKNOWN_STAGE: u16 = 5011;
    pub const WORKFLOW_MISSING_ARTIFACT: u16 = 5012;
    pub const WORKFLOW_TASK_PANICKED: u16 = 5013;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        // Configuration errors
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Invalid YAML syntax in configuration",
        1005 => "Invalid value in configuration",

        // Source errors
        2001 => "Source file does not exist or cannot be read",
        2002 => "Permission denied reading source file",
        2010 => "Source file is not a valid delimited table",
        2011 => "Source file has no header row",
        2012 => "Record length differs from header length",
        2013 => "Source file is not valid UTF-8",
        2014 => "Source header contains a duplicate column name",
        2015 => "Records file is not a JSON array of objects",

        // Merge errors
        3001 => "Join key column is missing from an input table",

        // Destination errors
        4001 => "Destination cannot be written",
        4002 => "Destination parent directory does not exist",
        4003 => "Permission denied writing destination",

        // Workflow errors
        5000 => "Generic workflow error",
        5007 => "Upstream stage did not succeed",
        5010 => "Circular dependency in stage graph",
        5011 => "Stage graph references an unknown stage",
        5012 => "Stage output missing from hand-off store",
        5013 => "Stage task panicked or was cancelled",

        _ => "Unknown error code",
    }
}
