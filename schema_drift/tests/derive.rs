use pretty_assertions::assert_eq;
use schema_drift::models::ModelRegistry;
use schema_drift::Entity;

#[allow(dead_code)]
#[derive(Entity)]
struct OrderLine {
    #[column(primary_key, auto_increment)]
    id: i64,
    #[column(name = "order_ref", references = "orders.id", comment = "owning order")]
    order_id: i64,
    #[column(default = "1")]
    quantity: i32,
    note: Option<String>,
    #[column(nullable = false)]
    sku: Option<String>,
}

#[test]
fn test_derived_descriptor() {
    let descriptor = OrderLine::descriptor();

    assert_eq!(descriptor.name, "OrderLine");
    assert_eq!(descriptor.table, None);
    assert_eq!(descriptor.fields.len(), 5);

    let id = &descriptor.fields[0];
    assert!(id.primary_key && id.auto_increment);
    assert_eq!(id.rust_type, "i64");

    let order = &descriptor.fields[1];
    assert_eq!(order.column_name.as_deref(), Some("order_ref"));
    assert_eq!(order.comment.as_deref(), Some("owning order"));
    let fk = order.foreign_key.as_ref().expect("foreign key");
    assert_eq!((fk.ref_table.as_str(), fk.ref_column.as_str()), ("orders", "id"));

    assert_eq!(descriptor.fields[2].default.as_deref(), Some("1"));
    assert!(descriptor.fields[3].nullable);
    assert_eq!(descriptor.fields[3].rust_type, "Option<String>");
    assert!(!descriptor.fields[4].nullable);
}

#[test]
fn test_registering_derived_entity() {
    let mut registry = ModelRegistry::new();
    registry.register::<OrderLine>();

    let model = registry.get_model("OrderLine").expect("registered");
    assert_eq!(model.fields.len(), 5);
    assert!(model.file_path.is_none());
}
