pub(crate) mod segments;
pub(crate) mod url;
