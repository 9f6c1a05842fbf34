//! Adapter for a live server over the blocking `postgres` client.
//!
//! The client runs in autocommit mode, so every `execute` is already durable
//! when it returns and `commit` only acknowledges.

use std::error::Error;

use bytes::BytesMut;
use postgres::types::{IsNull, ToSql, Type, WrongType, to_sql_checked};
use postgres::{Client, NoTls};
use uuid::Uuid;

use super::{Connection, DatabaseError};
use crate::column::Value;
use crate::sql::{Param, Statement};

impl From<postgres::Error> for DatabaseError {
    fn from(e: postgres::Error) -> Self {
        Self::Postgres(e)
    }
}

type BoxError = Box<dyn Error + Sync + Send>;

/// Encode `v` only if its native type matches the server's parameter type.
fn checked<T: ToSql>(v: &T, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if !T::accepts(ty) {
        return Err(Box::new(WrongType::new::<T>(ty.clone())));
    }
    v.to_sql(ty, out)
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Bool(v) => checked(v, ty, out),
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
            Self::Int(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql(ty, out),
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => (*v as f64).to_sql(ty, out),
                _ => checked(v, ty, out),
            },
            #[allow(clippy::cast_possible_truncation)]
            Self::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                _ => checked(v, ty, out),
            },
            Self::Text(v) => match *ty {
                Type::UUID => Uuid::parse_str(v)?.to_sql(ty, out),
                _ => checked(&v.as_str(), ty, out),
            },
            Self::Uuid(v) => checked(v, ty, out),
            Self::Timestamp(v) => checked(v, ty, out),
        }
    }

    // A value's type is only known per variant, so `to_sql` does the checking.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// A [`Connection`] backed by a live `postgres` server.
pub struct PostgresConnection {
    client: Client,
}

impl PostgresConnection {
    /// Connect with a libpq-style connection string.
    pub fn connect(dsn: &str) -> Result<Self, DatabaseError> {
        let client = Client::connect(dsn, NoTls)?;
        Ok(Self { client })
    }

    /// Wrap an already established client.
    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl Connection for PostgresConnection {
    fn execute(&mut self, statement: &Statement) -> Result<u64, DatabaseError> {
        let params: Vec<&(dyn ToSql + Sync)> = statement
            .params()
            .iter()
            .map(|p| match p {
                Param::Value(v) => v as &(dyn ToSql + Sync),
                Param::Array(vs) => vs as &(dyn ToSql + Sync),
            })
            .collect();

        tracing::trace!(sql = statement.sql(), params = params.len(), "executing");
        Ok(self.client.execute(statement.sql(), &params)?)
    }

    fn commit(&mut self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
