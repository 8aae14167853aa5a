//! Sample entity types.
//!
//! Plain immutable structs; `with_*` methods return modified copies.

use lodestore_codec::Value;
use lodestore_core::{CoreResult, Entity, PrimaryKey, RecordReader};

/// A bank account keyed by its text id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Account id.
    pub id: String,
    /// Holder name.
    pub owner: String,
    /// Balance in whole units.
    pub balance: i64,
}

impl Account {
    /// Creates an account owned by nobody in particular.
    pub fn new(id: impl Into<String>, balance: i64) -> Self {
        let id = id.into();
        Self {
            owner: id.clone(),
            id,
            balance,
        }
    }

    /// Returns a copy with a different owner.
    #[must_use]
    pub fn with_owner(&self, owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            ..self.clone()
        }
    }

    /// Returns a copy with a different balance.
    #[must_use]
    pub fn with_balance(&self, balance: i64) -> Self {
        Self {
            balance,
            ..self.clone()
        }
    }
}

impl Entity for Account {
    const TYPE_NAME: &'static str = "Account";

    fn primary_key(&self) -> PrimaryKey {
        PrimaryKey::Text(self.id.clone())
    }

    fn to_value(&self) -> Value {
        Value::map(vec![
            (Value::text("id"), Value::text(&self.id)),
            (Value::text("owner"), Value::text(&self.owner)),
            (Value::text("balance"), Value::Integer(self.balance)),
        ])
    }

    fn from_value(value: &Value) -> CoreResult<Self> {
        let record = RecordReader::new(Self::TYPE_NAME, value)?;
        Ok(Self {
            id: record.text("id")?,
            owner: record.text("owner")?,
            balance: record.integer("balance")?,
        })
    }
}

/// A city, embedded in streets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct City {
    /// City name.
    pub name: String,
    /// Country name.
    pub country: String,
}

impl City {
    /// Creates a Swedish city.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            country: "Sweden".to_string(),
        }
    }

    /// Returns a copy in a different country.
    #[must_use]
    pub fn with_country(&self, country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            ..self.clone()
        }
    }

    fn to_value(&self) -> Value {
        Value::map(vec![
            (Value::text("name"), Value::text(&self.name)),
            (Value::text("country"), Value::text(&self.country)),
        ])
    }

    fn from_reader(record: RecordReader<'_>) -> CoreResult<Self> {
        Ok(Self {
            name: record.text("name")?,
            country: record.text("country")?,
        })
    }
}

/// A street with an optional embedded city.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Street {
    /// Primary key.
    pub id: i64,
    /// Street name.
    pub street_name: String,
    /// House number.
    pub street_number: i64,
    /// City, when known.
    pub city: Option<City>,
}

impl Street {
    /// Creates a street without a city.
    pub fn new(id: i64, street_name: impl Into<String>, street_number: i64) -> Self {
        Self {
            id,
            street_name: street_name.into(),
            street_number,
            city: None,
        }
    }

    /// Returns a copy located in `city`.
    #[must_use]
    pub fn with_city(&self, city: City) -> Self {
        Self {
            city: Some(city),
            ..self.clone()
        }
    }

    /// Returns a copy with a different house number.
    #[must_use]
    pub fn with_street_number(&self, street_number: i64) -> Self {
        Self {
            street_number,
            ..self.clone()
        }
    }
}

impl Entity for Street {
    const TYPE_NAME: &'static str = "Street";

    fn primary_key(&self) -> PrimaryKey {
        PrimaryKey::Int(self.id)
    }

    fn to_value(&self) -> Value {
        let mut fields = vec![
            (Value::text("id"), Value::Integer(self.id)),
            (Value::text("streetName"), Value::text(&self.street_name)),
            (Value::text("streetNumber"), Value::Integer(self.street_number)),
        ];
        if let Some(city) = &self.city {
            fields.push((Value::text("city"), city.to_value()));
        }
        Value::map(fields)
    }

    fn from_value(value: &Value) -> CoreResult<Self> {
        let record = RecordReader::new(Self::TYPE_NAME, value)?;
        let city = match value.get("city") {
            Some(_) => Some(City::from_reader(record.nested("city")?)?),
            None => None,
        };
        Ok(Self {
            id: record.integer("id")?,
            street_name: record.text("streetName")?,
            street_number: record.integer("streetNumber")?,
            city,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestore_core::{decode_entity, encode_entity};

    #[test]
    fn builders_return_new_values() {
        let account = Account::new("a", 10);
        let richer = account.with_balance(20).with_owner("Ann");
        assert_eq!(account.balance, 10);
        assert_eq!(richer.balance, 20);
        assert_eq!(richer.owner, "Ann");
        assert_eq!(richer.id, "a");
    }

    #[test]
    fn street_with_and_without_city() {
        let bare = Street::new(1, "Storgatan", 3);
        assert_eq!(decode_entity::<Street>(&encode_entity(&bare)).unwrap(), bare);

        let located = bare.with_city(City::new("Stockholm").with_country("SE"));
        assert_eq!(
            decode_entity::<Street>(&encode_entity(&located)).unwrap(),
            located
        );
        assert_eq!(
            located.to_value().get_path(&["city", "name"]),
            Some(&Value::text("Stockholm"))
        );
    }
}
