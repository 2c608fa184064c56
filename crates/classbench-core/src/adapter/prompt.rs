//! Instruction text sent to the classifiers.

use std::path::Path;

fn class_list(classes: &[String]) -> String {
    let quoted: Vec<String> = classes.iter().map(|c| format!("'{c}'")).collect();
    format!("[{}]", quoted.join(", "))
}

/// Single-shot instruction accompanying the image in a direct request.
pub fn direct_prompt(classes: &[String]) -> String {
    let classes = class_list(classes);
    format!(
        "Given the image, identify the class. Use the following list of possible classes for your \
prediction. It should be one of the: {classes}. Be attentive to subtle details as some classes may \
appear similar.

Provide your answer in the following JSON format:
{{\"prediction\": \"class_name\"}}

Replace \"class_name\" with the appropriate class from the list above based on your analysis of the image.
The labels should be entered exactly as they are in the list above i.e., {classes}.
The response should start with {{ and contain only a JSON object (as specified above) and no other text."
    )
}

/// Task description handed to the agent; paths must be absolute.
pub fn agent_prompt(
    image_path: &Path,
    knowledge_path: Option<&Path>,
    classes: &[String],
    description: &str,
) -> String {
    let classes = class_list(classes);
    let image = image_path.display();
    let knowledge_steps = match knowledge_path {
        Some(kb) => format!(
            "1. Read the knowledge base at {} - focus on the section relevant to this dataset\n\
2. View the target image at {image}\n\
3. Compare visual features to the symptom descriptions\n\
4. If uncertain, view reference images from the knowledge base\n\
5. Make your prediction from the available classes only",
            kb.display()
        ),
        None => format!(
            "1. View the target image at {image}\n\
2. Make your prediction from the available classes only"
        ),
    };
    format!(
        "You are an image classification agent.

DATASET: {description}
AVAILABLE CLASSES: {classes}

TASK: Classify the condition in the image at: {image}

INSTRUCTIONS:
{knowledge_steps}

OUTPUT: After your analysis, return a JSON object:
{{\"prediction\": \"class_name\"}}

The prediction must be exactly one of: {classes}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes() -> Vec<String> {
        vec!["Anthracnose".to_string(), "Die_Back".to_string()]
    }

    #[test]
    fn direct_prompt_lists_classes_and_format() {
        let prompt = direct_prompt(&classes());
        assert!(prompt.contains("['Anthracnose', 'Die_Back']"));
        assert!(prompt.contains("{\"prediction\": \"class_name\"}"));
    }

    #[test]
    fn agent_prompt_names_paths() {
        let prompt = agent_prompt(
            Path::new("/corpus/Leaves/images/item_001.jpg"),
            Some(Path::new("/kb/symptoms.md")),
            &classes(),
            "Mango Leaf Diseases",
        );
        assert!(prompt.contains("/corpus/Leaves/images/item_001.jpg"));
        assert!(prompt.contains("/kb/symptoms.md"));
        assert!(prompt.contains("DATASET: Mango Leaf Diseases"));
    }

    #[test]
    fn agent_prompt_without_knowledge_skips_kb_steps() {
        let prompt = agent_prompt(Path::new("/img.jpg"), None, &classes(), "Leaves");
        assert!(!prompt.contains("knowledge base"));
    }
}
