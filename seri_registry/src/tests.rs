use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use request::{Arguments, Body, FnFunction, Properties, Request, ResolveContext};
use values::Value;

use crate::{deserialize, extract_uuid, resolve_serialized, RequestDeserializer, RequestResolver, SeriCatalog};

struct NullContext;
impl ResolveContext for NullContext {
  fn remotely(&self) -> bool {
    false
  }
  fn is_async(&self) -> bool {
    false
  }
  fn is_cancelled(&self) -> bool {
    false
  }
  fn as_any(&self) -> &dyn std::any::Any {
    self
  }
}

fn encoded_echo(uuid: &str, value: Value) -> Value {
  let mut fields = BTreeMap::new();
  fields.insert(Value::String("uuid".to_string()), Value::String(uuid.to_string()));
  fields.insert(Value::String("value".to_string()), value);
  Value::Mapping(fields)
}

struct EchoDeserializer {
  uuid: String,
}
impl RequestDeserializer for EchoDeserializer {
  fn deserialize(&self, encoded: &Value) -> Result<Arc<Request>, cradle_errors::CradleError> {
    let Value::Mapping(fields) = encoded else {
      return Err(cradle_errors::CradleError::ParsingError {
        expected_format: "echo request object".to_string(),
        excerpt: format!("{:?}", encoded.type_name()),
      });
    };
    let value = fields
      .get(&Value::String("value".to_string()))
      .cloned()
      .ok_or_else(|| cradle_errors::CradleError::MissingField {
        field: "value".to_string(),
      })?;
    Ok(Arc::new(Request::new(
      self.uuid.clone(),
      Arguments::literals(vec![value]),
      Properties::plain(),
      Body::Local(Arc::new(FnFunction(
        |_ctx: &dyn ResolveContext, args: &[Value]| {
          let value = args[0].clone();
          Box::pin(async move { Ok(value) }) as BoxFuture<'_, Result<Value, cradle_errors::CradleError>>
        },
      ))),
    )))
  }
}

struct EchoResolver;
impl RequestResolver for EchoResolver {
  fn resolve<'a>(
    &'a self,
    _ctx: &'a dyn ResolveContext,
    encoded: &'a Value,
  ) -> BoxFuture<'a, Result<Value, cradle_errors::CradleError>> {
    Box::pin(async move {
      let Value::Mapping(fields) = encoded else {
        return Err(cradle_errors::CradleError::ParsingError {
          expected_format: "echo request object".to_string(),
          excerpt: format!("{:?}", encoded.type_name()),
        });
      };
      fields
        .get(&Value::String("value".to_string()))
        .cloned()
        .ok_or_else(|| cradle_errors::CradleError::MissingField {
          field: "value".to_string(),
        })
    })
  }
}

#[test]
fn extract_uuid_reports_missing_field_distinctly_from_wrong_shape() {
  let mut fields = BTreeMap::new();
  fields.insert(Value::String("other".to_string()), Value::Nil);
  let missing = Value::Mapping(fields);
  assert!(matches!(
    extract_uuid(&missing),
    Err(cradle_errors::CradleError::MissingField { .. })
  ));

  let not_an_object = Value::Integer(1);
  assert!(matches!(
    extract_uuid(&not_an_object),
    Err(cradle_errors::CradleError::ParsingError { .. })
  ));
}

#[test]
fn unregistered_uuid_is_its_own_error_kind() {
  let encoded = encoded_echo("seri_registry::tests::never_registered", Value::Nil);
  assert!(matches!(
    deserialize(&encoded),
    Err(cradle_errors::CradleError::UnregisteredUuid { .. })
  ));
}

#[test]
fn catalog_registration_round_trips_deserialize() {
  let uuid = "seri_registry::tests::echo_a";
  let catalog = SeriCatalog::new();
  catalog.register(
    uuid,
    Arc::new(EchoDeserializer { uuid: uuid.to_string() }),
    Arc::new(EchoResolver),
  );

  let encoded = encoded_echo(uuid, Value::Integer(42));
  let request = deserialize(&encoded).unwrap();
  assert_eq!(request.uuid(), uuid);
}

#[tokio::test]
async fn resolve_serialized_dispatches_without_a_prior_deserialize() {
  let uuid = "seri_registry::tests::echo_b";
  let catalog = SeriCatalog::new();
  catalog.register(
    uuid,
    Arc::new(EchoDeserializer { uuid: uuid.to_string() }),
    Arc::new(EchoResolver),
  );

  let encoded = encoded_echo(uuid, Value::String("hi".to_string()));
  let value = resolve_serialized(&NullContext, &encoded).await.unwrap();
  assert_eq!(value, Value::String("hi".to_string()));
}

#[test]
fn dropping_the_catalog_removes_only_its_own_registrations() {
  let uuid_a = "seri_registry::tests::echo_c";
  let uuid_b = "seri_registry::tests::echo_d";
  let catalog_a = SeriCatalog::new();
  catalog_a.register(
    uuid_a,
    Arc::new(EchoDeserializer { uuid: uuid_a.to_string() }),
    Arc::new(EchoResolver),
  );
  let catalog_b = SeriCatalog::new();
  catalog_b.register(
    uuid_b,
    Arc::new(EchoDeserializer { uuid: uuid_b.to_string() }),
    Arc::new(EchoResolver),
  );

  drop(catalog_a);
  assert!(!SeriCatalog::is_registered(uuid_a));
  assert!(SeriCatalog::is_registered(uuid_b));
  drop(catalog_b);
}
