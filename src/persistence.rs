use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, PgPool};
use tokio::sync::RwLock;

use crate::models::{FieldType, Form, FormField, Replacements};

// ============================================================
// Store contract
// ============================================================

/// Storage for forms and their fields. Deleting a form deletes its fields.
#[async_trait]
pub trait FormStore: Send + Sync {
    async fn load_form(&self, id: i64) -> Result<Option<Form>>;

    async fn insert_form(&self, form: &Form) -> Result<Form>;

    async fn save_form(&self, form: &Form) -> Result<Form>;

    /// Removes the form and every field it owns.
    async fn delete_form(&self, id: i64) -> Result<bool>;

    /// Fields of a form, oldest first.
    async fn load_fields(&self, form_id: i64) -> Result<Vec<FormField>>;

    async fn insert_field(&self, form_id: i64, field: &FormField) -> Result<FormField>;

    async fn save_field(&self, field: &FormField) -> Result<FormField>;

    /// Swaps the whole field set of `form` for `fields` and saves `form`.
    /// Either everything is written or nothing is.
    async fn replace_fields(&self, form: &Form, fields: &[FormField]) -> Result<(Form, Vec<FormField>)>;
}

// ============================================================
// Rows
// ============================================================

#[derive(Debug, Clone, FromRow)]
struct FormRow {
    id: i64,
    title: String,
    template_uri: String,
    scheme: String,
    destination_path: String,
    replacements: String,
    default_entity_type: Option<String>,
    default_entity_id: Option<String>,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
    #[allow(dead_code)]
    updated_at: DateTime<Utc>,
}

impl From<FormRow> for Form {
    fn from(row: FormRow) -> Self {
        Form {
            id: Some(row.id),
            title: row.title,
            template_uri: row.template_uri,
            scheme: row.scheme,
            destination_path: row.destination_path,
            replacements: Replacements::parse(&row.replacements),
            default_entity_type: row.default_entity_type,
            default_entity_id: row.default_entity_id,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct FormFieldRow {
    id: i64,
    form_id: i64,
    pdf_key: String,
    field_type: String,
    value: String,
    prefix: String,
    suffix: String,
    replacements: String,
}

impl From<FormFieldRow> for FormField {
    fn from(row: FormFieldRow) -> Self {
        FormField {
            id: Some(row.id),
            form_id: Some(row.form_id),
            pdf_key: row.pdf_key,
            field_type: FieldType::from_name(&row.field_type),
            value: row.value,
            prefix: row.prefix,
            suffix: row.suffix,
            replacements: Replacements::parse(&row.replacements),
        }
    }
}

// ============================================================
// Postgres
// ============================================================

#[derive(Clone)]
pub struct PgFormStore {
    pool: PgPool,
}

impl PgFormStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn update_form<'e>(executor: impl PgExecutor<'e>, form: &Form) -> Result<Form> {
    let id = form.id.context("Cannot save a form that was never inserted")?;

    let row = sqlx::query_as::<_, FormRow>(
        r#"
        UPDATE fillpdf.forms
        SET title = $1,
            template_uri = $2,
            scheme = $3,
            destination_path = $4,
            replacements = $5,
            default_entity_type = $6,
            default_entity_id = $7,
            updated_at = now()
        WHERE id = $8
        RETURNING *
        "#,
    )
    .bind(&form.title)
    .bind(&form.template_uri)
    .bind(&form.scheme)
    .bind(&form.destination_path)
    .bind(form.replacements.to_text())
    .bind(&form.default_entity_type)
    .bind(&form.default_entity_id)
    .bind(id)
    .fetch_one(executor)
    .await
    .with_context(|| format!("Failed to update form {id}"))?;

    Ok(row.into())
}

async fn insert_field_row<'e>(
    executor: impl PgExecutor<'e>,
    form_id: i64,
    field: &FormField,
) -> Result<FormField> {
    let row = sqlx::query_as::<_, FormFieldRow>(
        r#"
        INSERT INTO fillpdf.form_fields (
            form_id, pdf_key, field_type, value, prefix, suffix, replacements
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(form_id)
    .bind(&field.pdf_key)
    .bind(field.field_type.as_str())
    .bind(&field.value)
    .bind(&field.prefix)
    .bind(&field.suffix)
    .bind(field.replacements.to_text())
    .fetch_one(executor)
    .await
    .with_context(|| format!("Failed to insert field {}", field.pdf_key))?;

    Ok(row.into())
}

#[async_trait]
impl FormStore for PgFormStore {
    async fn load_form(&self, id: i64) -> Result<Option<Form>> {
        let row = sqlx::query_as::<_, FormRow>("SELECT * FROM fillpdf.forms WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch form")?;

        Ok(row.map(Form::from))
    }

    async fn insert_form(&self, form: &Form) -> Result<Form> {
        let row = sqlx::query_as::<_, FormRow>(
            r#"
            INSERT INTO fillpdf.forms (
                title, template_uri, scheme, destination_path,
                replacements, default_entity_type, default_entity_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&form.title)
        .bind(&form.template_uri)
        .bind(&form.scheme)
        .bind(&form.destination_path)
        .bind(form.replacements.to_text())
        .bind(&form.default_entity_type)
        .bind(&form.default_entity_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert form")?;

        Ok(row.into())
    }

    async fn save_form(&self, form: &Form) -> Result<Form> {
        update_form(&self.pool, form).await
    }

    async fn delete_form(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM fillpdf.form_fields WHERE form_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete form fields")?;

        let result = sqlx::query("DELETE FROM fillpdf.forms WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete form")?;

        tx.commit().await.context("Failed to commit form deletion")?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_fields(&self, form_id: i64) -> Result<Vec<FormField>> {
        let rows = sqlx::query_as::<_, FormFieldRow>(
            "SELECT * FROM fillpdf.form_fields WHERE form_id = $1 ORDER BY id",
        )
        .bind(form_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list form fields")?;

        Ok(rows.into_iter().map(FormField::from).collect())
    }

    async fn insert_field(&self, form_id: i64, field: &FormField) -> Result<FormField> {
        insert_field_row(&self.pool, form_id, field).await
    }

    async fn save_field(&self, field: &FormField) -> Result<FormField> {
        let id = field.id.context("Cannot save a field that was never inserted")?;

        let row = sqlx::query_as::<_, FormFieldRow>(
            r#"
            UPDATE fillpdf.form_fields
            SET value = $1,
                prefix = $2,
                suffix = $3,
                replacements = $4,
                field_type = $5
            WHERE id = $6
            RETURNING *
            "#,
        )
        .bind(&field.value)
        .bind(&field.prefix)
        .bind(&field.suffix)
        .bind(field.replacements.to_text())
        .bind(field.field_type.as_str())
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to update field {}", field.pdf_key))?;

        Ok(row.into())
    }

    async fn replace_fields(&self, form: &Form, fields: &[FormField]) -> Result<(Form, Vec<FormField>)> {
        let form_id = form.id.context("Cannot replace fields of a form that was never inserted")?;
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM fillpdf.form_fields WHERE form_id = $1")
            .bind(form_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete old form fields")?;

        let mut stored = Vec::with_capacity(fields.len());
        for field in fields {
            stored.push(insert_field_row(&mut *tx, form_id, field).await?);
        }
        let form = update_form(&mut *tx, form).await?;

        tx.commit().await.context("Failed to commit field replacement")?;

        Ok((form, stored))
    }
}

// ============================================================
// In-process
// ============================================================

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    forms: BTreeMap<i64, Form>,
    fields: BTreeMap<i64, FormField>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn has_key(&self, form_id: i64, pdf_key: &str) -> bool {
        self.fields
            .values()
            .any(|field| field.form_id == Some(form_id) && field.pdf_key == pdf_key)
    }

    fn insert_field(&mut self, form_id: i64, field: &FormField) -> FormField {
        let id = self.allocate_id();
        let mut stored = field.clone();
        stored.id = Some(id);
        stored.form_id = Some(form_id);
        self.fields.insert(id, stored.clone());
        stored
    }
}

/// Keeps forms in memory. Backs tests and previews.
#[derive(Debug, Default)]
pub struct MemoryFormStore {
    state: RwLock<MemoryState>,
}

impl MemoryFormStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn field_count(&self) -> usize {
        self.state.read().await.fields.len()
    }
}

#[async_trait]
impl FormStore for MemoryFormStore {
    async fn load_form(&self, id: i64) -> Result<Option<Form>> {
        Ok(self.state.read().await.forms.get(&id).cloned())
    }

    async fn insert_form(&self, form: &Form) -> Result<Form> {
        let mut state = self.state.write().await;
        let mut stored = form.clone();
        stored.id = Some(state.allocate_id());
        state.forms.insert(stored.id.unwrap_or_default(), stored.clone());
        Ok(stored)
    }

    async fn save_form(&self, form: &Form) -> Result<Form> {
        let id = form.id.context("Cannot save a form that was never inserted")?;
        let mut state = self.state.write().await;
        let slot = state
            .forms
            .get_mut(&id)
            .with_context(|| format!("Form {id} does not exist"))?;
        *slot = form.clone();
        Ok(form.clone())
    }

    async fn delete_form(&self, id: i64) -> Result<bool> {
        let mut state = self.state.write().await;
        state.fields.retain(|_, field| field.form_id != Some(id));
        Ok(state.forms.remove(&id).is_some())
    }

    async fn load_fields(&self, form_id: i64) -> Result<Vec<FormField>> {
        Ok(self
            .state
            .read()
            .await
            .fields
            .values()
            .filter(|field| field.form_id == Some(form_id))
            .cloned()
            .collect())
    }

    async fn insert_field(&self, form_id: i64, field: &FormField) -> Result<FormField> {
        let mut state = self.state.write().await;
        anyhow::ensure!(state.forms.contains_key(&form_id), "Form {form_id} does not exist");
        anyhow::ensure!(
            !state.has_key(form_id, &field.pdf_key),
            "Form {form_id} already has a field {}",
            field.pdf_key
        );
        Ok(state.insert_field(form_id, field))
    }

    async fn save_field(&self, field: &FormField) -> Result<FormField> {
        let id = field.id.context("Cannot save a field that was never inserted")?;
        let mut state = self.state.write().await;
        let slot = state
            .fields
            .get_mut(&id)
            .with_context(|| format!("Field {id} does not exist"))?;
        *slot = field.clone();
        Ok(field.clone())
    }

    async fn replace_fields(&self, form: &Form, fields: &[FormField]) -> Result<(Form, Vec<FormField>)> {
        let form_id = form.id.context("Cannot replace fields of a form that was never inserted")?;
        let mut state = self.state.write().await;
        anyhow::ensure!(state.forms.contains_key(&form_id), "Form {form_id} does not exist");
        for (i, field) in fields.iter().enumerate() {
            anyhow::ensure!(
                fields[..i].iter().all(|earlier| earlier.pdf_key != field.pdf_key),
                "Field {} listed twice",
                field.pdf_key
            );
        }

        state.fields.retain(|_, field| field.form_id != Some(form_id));
        let stored = fields
            .iter()
            .map(|field| state.insert_field(form_id, field))
            .collect();
        state.forms.insert(form_id, form.clone());

        Ok((form.clone(), stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deleting_a_form_deletes_its_fields() {
        let store = MemoryFormStore::new();
        let form = store.insert_form(&Form::new("private://a.pdf")).await.unwrap();
        let other = store.insert_form(&Form::new("private://b.pdf")).await.unwrap();
        let form_id = form.id.unwrap();
        store
            .insert_field(form_id, &FormField::new("A", FieldType::Text))
            .await
            .unwrap();
        store
            .insert_field(other.id.unwrap(), &FormField::new("B", FieldType::Text))
            .await
            .unwrap();

        assert!(store.delete_form(form_id).await.unwrap());

        assert!(store.load_form(form_id).await.unwrap().is_none());
        assert!(store.load_fields(form_id).await.unwrap().is_empty());
        assert_eq!(store.field_count().await, 1);
    }

    #[tokio::test]
    async fn fields_load_in_insertion_order() {
        let store = MemoryFormStore::new();
        let form_id = store.insert_form(&Form::new("t.pdf")).await.unwrap().id.unwrap();
        for key in ["Zeta", "Alpha", "Mid"] {
            store
                .insert_field(form_id, &FormField::new(key, FieldType::Unknown))
                .await
                .unwrap();
        }
        let keys: Vec<_> = store
            .load_fields(form_id)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.pdf_key)
            .collect();
        assert_eq!(keys, ["Zeta", "Alpha", "Mid"]);
    }

    #[tokio::test]
    async fn rejected_field_replacement_keeps_the_old_set() {
        let store = MemoryFormStore::new();
        let form = store.insert_form(&Form::new("public://old.pdf")).await.unwrap();
        let form_id = form.id.unwrap();
        for key in ["A", "B"] {
            store
                .insert_field(form_id, &FormField::new(key, FieldType::Text).with_value("[node:title]"))
                .await
                .unwrap();
        }

        let mut swapped = form.clone();
        swapped.template_uri = "public://new.pdf".into();
        let duplicated = [FormField::new("A", FieldType::Text), FormField::new("A", FieldType::Text)];
        assert!(store.replace_fields(&swapped, &duplicated).await.is_err());

        assert_eq!(store.load_form(form_id).await.unwrap().unwrap().template_uri, "public://old.pdf");
        let kept: Vec<_> = store
            .load_fields(form_id)
            .await
            .unwrap()
            .into_iter()
            .map(|f| (f.pdf_key, f.value))
            .collect();
        assert_eq!(
            kept,
            [("A".to_string(), "[node:title]".to_string()), ("B".to_string(), "[node:title]".to_string())]
        );

        let (saved, fields) = store
            .replace_fields(&swapped, &[FormField::new("C", FieldType::Image)])
            .await
            .unwrap();
        assert_eq!(saved.template_uri, "public://new.pdf");
        assert_eq!(fields.len(), 1);
        assert_eq!(store.field_count().await, 1);
    }

    #[tokio::test]
    async fn pdf_keys_are_unique_per_form() {
        let store = MemoryFormStore::new();
        let form_id = store.insert_form(&Form::new("t.pdf")).await.unwrap().id.unwrap();
        store
            .insert_field(form_id, &FormField::new("A", FieldType::Text))
            .await
            .unwrap();
        assert!(store
            .insert_field(form_id, &FormField::new("A", FieldType::Image))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn saving_an_unknown_field_fails() {
        let store = MemoryFormStore::new();
        let mut field = FormField::new("A", FieldType::Text);
        assert!(store.save_field(&field).await.is_err());
        field.id = Some(42);
        assert!(store.save_field(&field).await.is_err());
    }
}
