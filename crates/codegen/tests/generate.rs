use std::fs;

use forge_codegen::CodeGenerator;

const ORDER: &str = r#"
name: Order
attributes:
  total:
    type: float
    fillable: true
  status:
    type: enum
    values: [pending, paid]
relations:
  belongs_to:
    - Customer
"#;

const CUSTOMER: &str = r#"
name: Customer
attributes:
  email:
    type: string
    fillable: true
relations:
  has_many:
    - Order
"#;

#[test]
fn test_generate_and_regenerate() {
    let schemas = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::write(schemas.path().join("order.yaml"), ORDER).unwrap();
    fs::write(schemas.path().join("customer.yml"), CUSTOMER).unwrap();

    let generator = CodeGenerator::new(output.path().to_path_buf());
    let written = generator.generate_dir(schemas.path()).unwrap();
    assert_eq!(written.len(), 3);

    let order_path = output.path().join("order.rs");
    let order = fs::read_to_string(&order_path).unwrap();
    assert!(order.contains("pub fn where_total(self, value: f64)"));
    assert!(order.contains("pub fn where_status(self, value: &str)"));
    assert!(order.contains("pub fn where_customer_id(self, value: i64)"));
    assert!(order.contains("pub async fn customer_belong(&self)"));

    let customer = fs::read_to_string(output.path().join("customer.rs")).unwrap();
    assert!(customer.contains("pub async fn orders(&self) -> ModelResult<Vec<ModelInstance>>"));

    let modules = fs::read_to_string(output.path().join("mod.rs")).unwrap();
    assert!(modules.contains("pub mod order;"));
    assert!(modules.contains("pub mod customer;"));

    // Hand-written code inside the custom block survives regeneration
    let edited = order.replace(
        "// <<<FORGE:BEGIN custom:order>>>\n",
        "// <<<FORGE:BEGIN custom:order>>>\npub const SHIPPING: f64 = 4.5;\n",
    );
    fs::write(&order_path, &edited).unwrap();

    let rewritten = generator.generate_dir(schemas.path()).unwrap();
    assert!(rewritten.is_empty());
    let order = fs::read_to_string(&order_path).unwrap();
    assert!(order.contains("pub const SHIPPING: f64 = 4.5;"));
}

#[test]
fn test_invalid_definitions_fail() {
    let schemas = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::write(schemas.path().join("order.yaml"), ORDER).unwrap();

    let generator = CodeGenerator::new(output.path().to_path_buf());
    let result = generator.generate_dir(schemas.path());
    assert!(matches!(result, Err(forge_codegen::CodegenError::Model(_))));
}
