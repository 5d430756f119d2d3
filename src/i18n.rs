use std::collections::HashMap;

pub struct I18n {
    translations: HashMap<String, HashMap<String, String>>,
    current_lang: String,
}

impl I18n {
    pub fn new(lang: &str) -> Self {
        let mut translations = HashMap::new();

        // English
        let mut en = HashMap::new();
        // Help texts
        en.insert("help_about".to_string(), "Undoable edits for a finance ledger".to_string());
        en.insert("help_label_usage".to_string(), "Usage:".to_string());
        en.insert("help_label_commands".to_string(), "Commands:".to_string());
        en.insert("help_label_options".to_string(), "Options:".to_string());
        en.insert("help_create".to_string(), "Create a record (--data <json> [--scope <project>])".to_string());
        en.insert("help_update".to_string(), "Replace a record with new data".to_string());
        en.insert("help_delete".to_string(), "Delete a record".to_string());
        en.insert("help_import".to_string(), "Create every record of a JSON array as one batch".to_string());
        en.insert("help_undo".to_string(), "Undo the last change (--yes skips the batch prompt)".to_string());
        en.insert("help_redo".to_string(), "Redo the last undone change".to_string());
        en.insert("help_history".to_string(), "List history (--filter, --max-shown, --redo)".to_string());
        en.insert("help_show".to_string(), "List stored records of a kind".to_string());
        en.insert("help_clear".to_string(), "Forget all history".to_string());
        en.insert("help_limit".to_string(), "Set how many changes can be undone (10-100)".to_string());
        en.insert("help_kinds".to_string(), "Kinds: transaction, account, category, budget (transactions and budgets need --scope)".to_string());
        // Config help
        en.insert("help_config_section".to_string(), "Config (~/.ul/config.toml, UL_HOME moves the directory):".to_string());
        en.insert("help_config_history".to_string(), "history.file, history.max_stack_size (default 25)".to_string());
        en.insert("help_config_display".to_string(), "display.language: auto | en | es; display.max_history_shown".to_string());
        en.insert("help_log_env".to_string(), "Set UL_LOG=info (or debug) to see what happens under the hood".to_string());

        // Runtime messages
        en.insert("executed".to_string(), "Done: {0}".to_string());
        en.insert("execute_failed".to_string(), "Could not apply: {0}".to_string());
        en.insert("undone".to_string(), "Undone: {0}".to_string());
        en.insert("redone".to_string(), "Redone: {0}".to_string());
        en.insert("undo_failed".to_string(), "Undo failed, the entry stays in history: {0}".to_string());
        en.insert("redo_failed".to_string(), "Redo failed, the entry stays in history: {0}".to_string());
        en.insert("nothing_to_undo".to_string(), "Nothing to undo".to_string());
        en.insert("nothing_to_redo".to_string(), "Nothing to redo".to_string());
        en.insert("confirm_batch_undo".to_string(), "Undo \"{0}\"? [y/N] ".to_string());
        en.insert("confirm_batch_redo".to_string(), "Redo \"{0}\"? [y/N] ".to_string());
        en.insert("cancelled".to_string(), "Cancelled".to_string());
        en.insert("next_undo".to_string(), "Next undo: {0}".to_string());

        // History listing
        en.insert("no_history".to_string(), "History is empty".to_string());
        en.insert("no_matches".to_string(), "No matches found".to_string());
        en.insert("history_title".to_string(), "Undo history (most recent first):".to_string());
        en.insert("redo_title".to_string(), "Redo history (next to redo first):".to_string());
        en.insert("more_entries".to_string(), "... {0} more, use --max-shown to see them".to_string());
        en.insert("batch_marker".to_string(), "batch".to_string());
        en.insert("history_cleared".to_string(), "History cleared".to_string());
        en.insert("limit_set".to_string(), "History limit set to {0}".to_string());

        // Records
        en.insert("no_records".to_string(), "No records".to_string());
        en.insert("records_title".to_string(), "{0} ({1}):".to_string());
        en.insert("import_label".to_string(), "Import {0} from {1}".to_string());
        en.insert("import_empty".to_string(), "Nothing to import".to_string());

        // Error messages
        en.insert("error_scope_required".to_string(), "{0} records need --scope <project id>".to_string());
        en.insert("error_record_not_found".to_string(), "No {0} with id {1}".to_string());
        en.insert("error_invalid_data".to_string(), "--data must be a JSON object".to_string());
        en.insert("error_import_not_array".to_string(), "Import file must hold a JSON array of objects".to_string());
        en.insert("error_import_missing_id".to_string(), "Import entry {0} has no \"id\"".to_string());
        en.insert("error_read_import".to_string(), "Failed to read import file".to_string());
        en.insert("error_open_store".to_string(), "Failed to open data store".to_string());

        // Spanish
        let mut es = HashMap::new();
        // Help texts
        es.insert("help_about".to_string(), "Cambios reversibles para un libro contable".to_string());
        es.insert("help_label_usage".to_string(), "Uso:".to_string());
        es.insert("help_label_commands".to_string(), "Comandos:".to_string());
        es.insert("help_label_options".to_string(), "Opciones:".to_string());
        es.insert("help_create".to_string(), "Crear un registro (--data <json> [--scope <proyecto>])".to_string());
        es.insert("help_update".to_string(), "Reemplazar un registro con datos nuevos".to_string());
        es.insert("help_delete".to_string(), "Eliminar un registro".to_string());
        es.insert("help_import".to_string(), "Crear cada registro de un arreglo JSON como un lote".to_string());
        es.insert("help_undo".to_string(), "Deshacer el último cambio (--yes omite la confirmación de lotes)".to_string());
        es.insert("help_redo".to_string(), "Rehacer el último cambio deshecho".to_string());
        es.insert("help_history".to_string(), "Listar el historial (--filter, --max-shown, --redo)".to_string());
        es.insert("help_show".to_string(), "Listar los registros guardados de un tipo".to_string());
        es.insert("help_clear".to_string(), "Olvidar todo el historial".to_string());
        es.insert("help_limit".to_string(), "Fijar cuántos cambios se pueden deshacer (10-100)".to_string());
        es.insert("help_kinds".to_string(), "Tipos: transaction, account, category, budget (transacciones y presupuestos requieren --scope)".to_string());
        // Config help
        es.insert("help_config_section".to_string(), "Configuración (~/.ul/config.toml, UL_HOME cambia el directorio):".to_string());
        es.insert("help_config_history".to_string(), "history.file, history.max_stack_size (por defecto 25)".to_string());
        es.insert("help_config_display".to_string(), "display.language: auto | en | es; display.max_history_shown".to_string());
        es.insert("help_log_env".to_string(), "Use UL_LOG=info (o debug) para ver el detalle de cada operación".to_string());

        // Runtime messages
        es.insert("executed".to_string(), "Hecho: {0}".to_string());
        es.insert("execute_failed".to_string(), "No se pudo aplicar: {0}".to_string());
        es.insert("undone".to_string(), "Deshecho: {0}".to_string());
        es.insert("redone".to_string(), "Rehecho: {0}".to_string());
        es.insert("undo_failed".to_string(), "No se pudo deshacer, la entrada sigue en el historial: {0}".to_string());
        es.insert("redo_failed".to_string(), "No se pudo rehacer, la entrada sigue en el historial: {0}".to_string());
        es.insert("nothing_to_undo".to_string(), "No hay nada que deshacer".to_string());
        es.insert("nothing_to_redo".to_string(), "No hay nada que rehacer".to_string());
        es.insert("confirm_batch_undo".to_string(), "¿Deshacer \"{0}\"? [s/N] ".to_string());
        es.insert("confirm_batch_redo".to_string(), "¿Rehacer \"{0}\"? [s/N] ".to_string());
        es.insert("cancelled".to_string(), "Cancelado".to_string());
        es.insert("next_undo".to_string(), "Siguiente para deshacer: {0}".to_string());

        // History listing
        es.insert("no_history".to_string(), "El historial está vacío".to_string());
        es.insert("no_matches".to_string(), "Sin coincidencias".to_string());
        es.insert("history_title".to_string(), "Historial para deshacer (más reciente primero):".to_string());
        es.insert("redo_title".to_string(), "Historial para rehacer (siguiente primero):".to_string());
        es.insert("more_entries".to_string(), "... {0} más, use --max-shown para verlos".to_string());
        es.insert("batch_marker".to_string(), "lote".to_string());
        es.insert("history_cleared".to_string(), "Historial borrado".to_string());
        es.insert("limit_set".to_string(), "Límite del historial: {0}".to_string());

        // Records
        es.insert("no_records".to_string(), "No hay registros".to_string());
        es.insert("records_title".to_string(), "{0} ({1}):".to_string());
        es.insert("import_label".to_string(), "Importar {0} desde {1}".to_string());
        es.insert("import_empty".to_string(), "Nada que importar".to_string());

        // Error messages
        es.insert("error_scope_required".to_string(), "Los registros de tipo {0} requieren --scope <id de proyecto>".to_string());
        es.insert("error_record_not_found".to_string(), "No existe {0} con id {1}".to_string());
        es.insert("error_invalid_data".to_string(), "--data debe ser un objeto JSON".to_string());
        es.insert("error_import_not_array".to_string(), "El archivo debe contener un arreglo JSON de objetos".to_string());
        es.insert("error_import_missing_id".to_string(), "La entrada {0} no tiene \"id\"".to_string());
        es.insert("error_read_import".to_string(), "No se pudo leer el archivo de importación".to_string());
        es.insert("error_open_store".to_string(), "No se pudo abrir el almacén de datos".to_string());

        translations.insert("en".to_string(), en);
        translations.insert("es".to_string(), es);

        // es, es_ES, es_MX, spanish, español ...
        let lower = lang.to_lowercase();
        let effective_lang = if lower.starts_with("es") || lower == "spanish" {
            "es"
        } else {
            "en"
        };

        Self {
            translations,
            current_lang: effective_lang.to_string(),
        }
    }

    pub fn lang(&self) -> &str {
        &self.current_lang
    }

    /// Yes-answers accepted at confirmation prompts.
    pub fn is_yes(&self, answer: &str) -> bool {
        let answer = answer.trim().to_lowercase();
        match self.current_lang.as_str() {
            "es" => matches!(answer.as_str(), "s" | "si" | "sí" | "y" | "yes"),
            _ => matches!(answer.as_str(), "y" | "yes"),
        }
    }

    pub fn t(&self, key: &str) -> String {
        if let Some(lang_map) = self.translations.get(&self.current_lang) {
            if let Some(value) = lang_map.get(key) {
                return value.clone();
            }
        }
        key.to_string()
    }

    pub fn t_format(&self, key: &str, args: &[&str]) -> String {
        let mut result = self.t(key);
        for (i, arg) in args.iter().enumerate() {
            result = result.replace(&format!("{{{}}}", i), arg);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_resolution() {
        assert_eq!(I18n::new("es_MX").lang(), "es");
        assert_eq!(I18n::new("Spanish").lang(), "es");
        assert_eq!(I18n::new("en_US").lang(), "en");
        assert_eq!(I18n::new("zh_CN").lang(), "en");
    }

    #[test]
    fn test_format_and_fallback() {
        let i18n = I18n::new("en");
        assert_eq!(i18n.t_format("undone", &["Create account: Caja"]), "Undone: Create account: Caja");
        assert_eq!(i18n.t("missing_key"), "missing_key");

        let es = I18n::new("es");
        assert_eq!(es.t_format("error_record_not_found", &["account", "A1"]), "No existe account con id A1");
    }

    #[test]
    fn test_next_undo_line() {
        let en = I18n::new("en");
        assert_eq!(en.t_format("next_undo", &["Create account: Caja"]), "Next undo: Create account: Caja");
        let es = I18n::new("es");
        assert_eq!(
            es.t_format("next_undo", &["Create account: Caja"]),
            "Siguiente para deshacer: Create account: Caja"
        );
    }

    #[test]
    fn test_catalogues_have_same_keys() {
        let i18n = I18n::new("en");
        let en = &i18n.translations["en"];
        let es = &i18n.translations["es"];
        let mut missing: Vec<&String> = en.keys().filter(|k| !es.contains_key(*k)).collect();
        missing.extend(es.keys().filter(|k| !en.contains_key(*k)));
        assert!(missing.is_empty(), "keys missing a translation: {:?}", missing);
    }

    #[test]
    fn test_yes_answers() {
        assert!(I18n::new("es").is_yes(" Sí "));
        assert!(I18n::new("en").is_yes("Y"));
        assert!(!I18n::new("en").is_yes("s"));
        assert!(!I18n::new("en").is_yes(""));
    }
}
