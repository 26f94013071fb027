use crate::domain::{ColumnSchema, Row};
use crate::loader::LoadedTable;
use crate::rows::{batches_to_rows, type_name, type_tag};

pub const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct TableProfile {
    pub columns: Vec<ColumnSchema>,
    pub row_count: usize,
    pub preview: Vec<Row>,
}

pub fn profile(table: &LoadedTable) -> TableProfile {
    let columns = table
        .schema
        .fields()
        .iter()
        .map(|field| ColumnSchema {
            name: field.name().clone(),
            type_tag: type_tag(field.data_type()),
            data_type: type_name(field.data_type()),
        })
        .collect();

    TableProfile {
        columns,
        row_count: table.num_rows(),
        preview: batches_to_rows(&table.batches, Some(PREVIEW_ROWS)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataFormat;
    use crate::domain::{TypeTag, Value};
    use crate::loader::FormatLoaders;

    #[test]
    fn profiles_columns_in_order_with_bounded_preview() {
        let csv = "when,qty,price,ok,label\n\
                   2024-01-01,1,1.5,true,a\n\
                   2024-01-02,2,2.5,false,b\n\
                   2024-01-03,3,3.5,true,c\n\
                   2024-01-04,4,4.5,false,d\n\
                   2024-01-05,5,5.5,true,e\n\
                   2024-01-06,6,6.5,false,f\n";
        let table = FormatLoaders::default()
            .load(csv.as_bytes(), DataFormat::Csv)
            .unwrap();

        let profile = profile(&table);

        let tags: Vec<(String, TypeTag)> = profile
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.type_tag))
            .collect();
        assert_eq!(
            tags,
            vec![
                ("when".to_string(), TypeTag::Temporal),
                ("qty".to_string(), TypeTag::Integer),
                ("price".to_string(), TypeTag::Float),
                ("ok".to_string(), TypeTag::Boolean),
                ("label".to_string(), TypeTag::Text),
            ]
        );
        assert_eq!(profile.row_count, 6);
        assert_eq!(profile.preview.len(), PREVIEW_ROWS);
        assert_eq!(profile.preview[4].get("label"), Some(&Value::Text("e".to_string())));
        assert_eq!(
            profile.preview[0].columns().collect::<Vec<_>>(),
            vec!["when", "qty", "price", "ok", "label"]
        );
    }

    #[test]
    fn profiling_is_deterministic() {
        let table = FormatLoaders::default()
            .load(b"a,b\n1,x\n2,y\n", DataFormat::Csv)
            .unwrap();
        assert_eq!(profile(&table), profile(&table));
    }
}
