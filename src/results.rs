mod row;

pub use row::DataRow;
